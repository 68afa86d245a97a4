//! Tool call identifier type using TypeID format.
//!
//! Providers normally assign their own tool call ids (`call_abc123`,
//! `toolu_01...`). When a provider omits one, a `ToolCallId` is generated so
//! every tool call part carries a stable identity.
//! Format: `call_01h455vb4pex5vsknk084sn02q`

use mti::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A generated tool call identifier.
///
/// Uses TypeID format for human-readable, time-sortable, globally unique IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolCallId(MagicTypeId);

/// Error returned when attempting to parse an invalid tool call ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidToolCallId {
    /// TypeID parsing failed
    Parse(String),
    /// Wrong prefix (expected "call")
    WrongPrefix {
        /// The expected prefix
        expected: &'static str,
        /// The actual prefix found
        actual: String,
    },
}

impl fmt::Display for InvalidToolCallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "invalid tool call ID: {e}"),
            Self::WrongPrefix { expected, actual } => {
                write!(f, "expected prefix '{expected}', got '{actual}'")
            }
        }
    }
}

impl std::error::Error for InvalidToolCallId {}

impl ToolCallId {
    /// The TypeID prefix for generated tool call identifiers.
    pub const PREFIX: &'static str = "call";

    /// Creates a new tool call ID with a fresh UUIDv7.
    #[must_use]
    pub fn new() -> Self {
        Self(Self::PREFIX.create_type_id::<V7>())
    }

    /// Parses a generated tool call ID, validating the prefix.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToolCallId::Parse` if the string is not a valid TypeID.
    /// Returns `InvalidToolCallId::WrongPrefix` if the TypeID has a different prefix.
    pub fn parse(s: &str) -> Result<Self, InvalidToolCallId> {
        let id = MagicTypeId::from_str(s).map_err(|e| InvalidToolCallId::Parse(e.to_string()))?;

        let prefix = id.prefix().as_str();
        if prefix != Self::PREFIX {
            return Err(InvalidToolCallId::WrongPrefix {
                expected: Self::PREFIX,
                actual: prefix.to_string(),
            });
        }

        Ok(Self(id))
    }
}

impl Default for ToolCallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ToolCallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ToolCallId {
    type Err = InvalidToolCallId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ToolCallId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ToolCallId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
