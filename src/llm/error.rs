//! Model error types.
//!
//! Errors for model requests, stream decoding and accumulation, model
//! resolution and the process-wide request gate.

use crate::error::{ConfigError, PartsError};
use std::fmt;

/// Errors that can occur making or consuming a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelError {
    /// The specific error that occurred
    pub kind: ModelErrorKind,
}

/// Specific model error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// A delta could not be merged into the response parts
    Parts(PartsError),
    /// A raw provider chunk could not be decoded
    UpstreamDecode {
        /// Provider whose chunk failed to decode
        provider: String,
        /// Description of the decode failure
        message: String,
    },
    /// The model does not implement the operation
    UnsupportedOperation {
        /// The operation that was attempted
        operation: String,
        /// The model variant that rejected it
        model: String,
    },
    /// A model string or setting could not be resolved
    Configuration {
        /// The configuration field that was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },
    /// Real model requests are disabled process-wide
    RequestsDisabled,
    /// The transport failed while sending or receiving
    Transport {
        /// Description of the transport failure
        message: String,
    },
    /// The provider API returned an error response
    Api {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },
    /// The model did something the protocol does not allow
    UnexpectedModelBehavior {
        /// What happened
        message: String,
    },
}

impl ModelError {
    /// Creates a new ModelError with the given kind.
    #[must_use]
    pub fn new(kind: ModelErrorKind) -> Self {
        Self { kind }
    }

    /// Creates an upstream decode error.
    #[must_use]
    pub fn upstream_decode(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::UpstreamDecode {
            provider: provider.into(),
            message: message.into(),
        })
    }

    /// Creates an unsupported operation error.
    #[must_use]
    pub fn unsupported_operation(operation: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::UnsupportedOperation {
            operation: operation.into(),
            model: model.into(),
        })
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::Configuration {
            field: field.into(),
            reason: reason.into(),
        })
    }

    /// Creates a requests disabled error.
    #[must_use]
    pub fn requests_disabled() -> Self {
        Self::new(ModelErrorKind::RequestsDisabled)
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::Transport {
            message: message.into(),
        })
    }

    /// Creates an API error.
    #[must_use]
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::Api {
            status_code,
            message: message.into(),
        })
    }

    /// Creates an unexpected model behavior error.
    #[must_use]
    pub fn unexpected_model_behavior(message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::UnexpectedModelBehavior {
            message: message.into(),
        })
    }

    /// Returns true if this is a parts error.
    #[must_use]
    pub fn is_parts(&self) -> bool {
        matches!(self.kind, ModelErrorKind::Parts(_))
    }

    /// Returns true if this is an upstream decode error.
    #[must_use]
    pub fn is_upstream_decode(&self) -> bool {
        matches!(self.kind, ModelErrorKind::UpstreamDecode { .. })
    }

    /// Returns true if this is an unsupported operation error.
    #[must_use]
    pub fn is_unsupported_operation(&self) -> bool {
        matches!(self.kind, ModelErrorKind::UnsupportedOperation { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self.kind, ModelErrorKind::Configuration { .. })
    }

    /// Returns true if this is a requests disabled error.
    #[must_use]
    pub fn is_requests_disabled(&self) -> bool {
        matches!(self.kind, ModelErrorKind::RequestsDisabled)
    }

    /// Returns the parts error if this error wraps one.
    #[must_use]
    pub fn as_parts(&self) -> Option<&PartsError> {
        match &self.kind {
            ModelErrorKind::Parts(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if this error is retriable.
    ///
    /// Only transport-level failures qualify. Nothing in this crate retries;
    /// callers layering retry around a model use this to decide.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            ModelErrorKind::Transport { .. }
                | ModelErrorKind::Api {
                    status_code: 429 | 500..=599,
                    ..
                }
        )
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ModelErrorKind::Parts(e) => write!(f, "{}", e),
            ModelErrorKind::UpstreamDecode { provider, message } => {
                write!(f, "failed to decode {} stream chunk: {}", provider, message)
            }
            ModelErrorKind::UnsupportedOperation { operation, model } => {
                write!(f, "{} is not supported by {}", operation, model)
            }
            ModelErrorKind::Configuration { field, reason } => {
                write!(f, "invalid configuration for '{}': {}", field, reason)
            }
            ModelErrorKind::RequestsDisabled => {
                write!(
                    f,
                    "model requests are not allowed, since the request gate is off; \
                     use a test model or re-enable requests"
                )
            }
            ModelErrorKind::Transport { message } => {
                write!(
                    f,
                    "transport error communicating with model API: {}; check network connectivity",
                    message
                )
            }
            ModelErrorKind::Api {
                status_code,
                message,
            } => {
                write!(f, "API error (HTTP {}): {}", status_code, message)
            }
            ModelErrorKind::UnexpectedModelBehavior { message } => {
                write!(f, "unexpected model behavior: {}", message)
            }
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ModelErrorKind::Parts(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PartsError> for ModelError {
    fn from(error: PartsError) -> Self {
        Self::new(ModelErrorKind::Parts(error))
    }
}

impl From<ConfigError> for ModelError {
    fn from(error: ConfigError) -> Self {
        Self::configuration(error.field().to_string(), error.to_string())
    }
}
