//! Vendor-assigned part identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The key a provider uses to say which response part a delta belongs to.
///
/// Most providers use integer block indices. OpenAI streams its single text
/// part without an index, so its decoder keys it with the string `"content"`
/// while tool calls use their integer `index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VendorPartId {
    /// Integer index.
    Index(u64),
    /// String key.
    Key(String),
}

impl fmt::Display for VendorPartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Key(k) => write!(f, "{k}"),
        }
    }
}

impl From<u64> for VendorPartId {
    fn from(i: u64) -> Self {
        Self::Index(i)
    }
}

impl From<u32> for VendorPartId {
    fn from(i: u32) -> Self {
        Self::Index(u64::from(i))
    }
}

impl From<usize> for VendorPartId {
    fn from(i: usize) -> Self {
        Self::Index(i as u64)
    }
}

impl From<&str> for VendorPartId {
    fn from(s: &str) -> Self {
        Self::Key(s.to_string())
    }
}

impl From<String> for VendorPartId {
    fn from(s: String) -> Self {
        Self::Key(s)
    }
}
