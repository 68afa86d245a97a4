//! Error types for response accumulation and configuration.
//!
//! Each error implements Display, Debug, Clone, PartialEq, Eq, and
//! std::error::Error. Model-level errors live in [`crate::llm::ModelError`].
//!
//! No external error crates (anyhow, thiserror, eyre) are used in the library.

use crate::messages::PartKind;
use crate::types::VendorPartId;
use std::fmt;

/// Errors raised while merging deltas into response parts.
///
/// Every one of these is fatal to the stream that produced it. The parts
/// manager rejects the offending delta without changing any state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartsError {
    /// The specific error that occurred
    pub kind: PartsErrorKind,
}

/// Specific parts error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartsErrorKind {
    /// A delta targeted a slot holding a part of a different kind
    ConflictingPartKind {
        /// The slot the delta targeted
        vendor_id: VendorPartId,
        /// Kind of the part already in the slot
        existing: PartKind,
        /// Kind the delta tried to apply
        attempted: PartKind,
    },
    /// A first-seen tool call delta carried neither a name nor an id
    IncompleteToolCall {
        /// The slot the delta targeted
        vendor_id: VendorPartId,
    },
    /// A tool call args delta did not match the manager's merge strategy
    ArgsStrategyMismatch {
        /// The slot the delta targeted
        vendor_id: VendorPartId,
        /// Name of the strategy the manager was built with
        expected: &'static str,
    },
}

impl PartsError {
    /// Creates a new PartsError with the given kind.
    #[must_use]
    pub fn new(kind: PartsErrorKind) -> Self {
        Self { kind }
    }

    /// Creates a conflicting part kind error.
    #[must_use]
    pub fn conflicting_part_kind(
        vendor_id: VendorPartId,
        existing: PartKind,
        attempted: PartKind,
    ) -> Self {
        Self::new(PartsErrorKind::ConflictingPartKind {
            vendor_id,
            existing,
            attempted,
        })
    }

    /// Creates an incomplete tool call error.
    #[must_use]
    pub fn incomplete_tool_call(vendor_id: VendorPartId) -> Self {
        Self::new(PartsErrorKind::IncompleteToolCall { vendor_id })
    }

    /// Creates an args strategy mismatch error.
    #[must_use]
    pub fn args_strategy_mismatch(vendor_id: VendorPartId, expected: &'static str) -> Self {
        Self::new(PartsErrorKind::ArgsStrategyMismatch {
            vendor_id,
            expected,
        })
    }

    /// Returns true if this is a conflicting part kind error.
    #[must_use]
    pub fn is_conflicting_part_kind(&self) -> bool {
        matches!(self.kind, PartsErrorKind::ConflictingPartKind { .. })
    }

    /// Returns true if this is an incomplete tool call error.
    #[must_use]
    pub fn is_incomplete_tool_call(&self) -> bool {
        matches!(self.kind, PartsErrorKind::IncompleteToolCall { .. })
    }

    /// Returns the slot the rejected delta targeted.
    #[must_use]
    pub fn vendor_id(&self) -> &VendorPartId {
        match &self.kind {
            PartsErrorKind::ConflictingPartKind { vendor_id, .. }
            | PartsErrorKind::IncompleteToolCall { vendor_id }
            | PartsErrorKind::ArgsStrategyMismatch { vendor_id, .. } => vendor_id,
        }
    }
}

impl fmt::Display for PartsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PartsErrorKind::ConflictingPartKind {
                vendor_id,
                existing,
                attempted,
            } => {
                write!(
                    f,
                    "cannot apply a {} delta to part '{}' which is a {} part",
                    attempted, vendor_id, existing
                )
            }
            PartsErrorKind::IncompleteToolCall { vendor_id } => {
                write!(
                    f,
                    "tool call delta for new part '{}' has neither a tool name nor a tool call id",
                    vendor_id
                )
            }
            PartsErrorKind::ArgsStrategyMismatch {
                vendor_id,
                expected,
            } => {
                write!(
                    f,
                    "tool call args for part '{}' do not match the '{}' merge strategy; \
                     build the parts manager with the strategy the provider streams",
                    vendor_id, expected
                )
            }
        }
    }
}

impl std::error::Error for PartsError {}

/// Errors that can occur loading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// The specific error that occurred
    pub kind: ConfigErrorKind,
}

/// Specific configuration error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// A config file could not be read
    ReadFailed {
        /// Path of the file
        path: String,
        /// Underlying I/O failure
        reason: String,
    },
    /// Config text is not valid TOML for the schema
    ParseFailed {
        /// Path of the file, if the text came from one
        path: Option<String>,
        /// Parser message
        reason: String,
    },
    /// A configuration value is invalid
    InvalidValue {
        /// The field that was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },
}

impl ConfigError {
    /// Creates a new ConfigError with the given kind.
    #[must_use]
    pub fn new(kind: ConfigErrorKind) -> Self {
        Self { kind }
    }

    /// Creates a read failed error.
    #[must_use]
    pub fn read_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::ReadFailed {
            path: path.into(),
            reason: reason.into(),
        })
    }

    /// Creates a parse failed error.
    #[must_use]
    pub fn parse_failed(path: Option<String>, reason: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::ParseFailed {
            path,
            reason: reason.into(),
        })
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        })
    }

    /// Returns the config field this error refers to.
    #[must_use]
    pub fn field(&self) -> &str {
        match &self.kind {
            ConfigErrorKind::ReadFailed { .. } => "config_file",
            ConfigErrorKind::ParseFailed { .. } => "config",
            ConfigErrorKind::InvalidValue { field, .. } => field,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConfigErrorKind::ReadFailed { path, reason } => {
                write!(f, "failed to read config file '{}': {}", path, reason)
            }
            ConfigErrorKind::ParseFailed {
                path: Some(path),
                reason,
            } => {
                write!(f, "failed to parse '{}': {}", path, reason)
            }
            ConfigErrorKind::ParseFailed { path: None, reason } => {
                write!(f, "invalid TOML: {}", reason)
            }
            ConfigErrorKind::InvalidValue { field, reason } => {
                write!(f, "invalid configuration for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_part_kind_display() {
        let error = PartsError::conflicting_part_kind(
            VendorPartId::from(0usize),
            PartKind::ToolCall,
            PartKind::Text,
        );

        let message = error.to_string();
        assert!(message.contains("text delta"));
        assert!(message.contains("tool-call part"));
        assert!(message.contains("'0'"));
        assert!(error.is_conflicting_part_kind());
    }

    #[test]
    fn incomplete_tool_call_display() {
        let error = PartsError::incomplete_tool_call(VendorPartId::from("call"));

        assert!(error.to_string().contains("neither a tool name nor a tool call id"));
        assert!(error.is_incomplete_tool_call());
        assert_eq!(error.vendor_id(), &VendorPartId::from("call"));
    }

    #[test]
    fn strategy_mismatch_display_names_strategy() {
        let error = PartsError::args_strategy_mismatch(VendorPartId::from(3u64), "json-fragments");
        assert!(error.to_string().contains("json-fragments"));
    }

    #[test]
    fn parts_errors_are_eq() {
        let a = PartsError::incomplete_tool_call(VendorPartId::from(1u64));
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, PartsError::incomplete_tool_call(VendorPartId::from(2u64)));
    }

    #[test]
    fn config_error_display() {
        let error = ConfigError::read_failed("/tmp/x.toml", "not found");
        assert!(error.to_string().contains("/tmp/x.toml"));
        assert_eq!(error.field(), "config_file");

        let error = ConfigError::parse_failed(None, "expected '='");
        assert!(error.to_string().starts_with("invalid TOML"));

        let error = ConfigError::invalid_value("default_model", "empty");
        assert_eq!(error.field(), "default_model");
    }
}
