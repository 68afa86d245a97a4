//! Provider connection configuration.
//!
//! Connection settings for the HTTP-backed models: endpoint, credentials,
//! timeout and the default output token limit.

use crate::llm::error::ModelError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Placeholder key sent to OpenAI-compatible servers when none is configured.
///
/// Locally served OpenAI-compatible models often need no key, but clients
/// must still send a non-empty one.
pub const API_KEY_NOT_SET: &str = "api-key-not-set";

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Anthropic API base URL.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Default DeepSeek API base URL.
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";

/// Default Ollama base URL.
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Connection settings for one provider endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key (may be empty for local providers)
    pub api_key: String,
    /// Base URL for the API
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Output token limit used when a request does not set one
    pub max_tokens: u32,
    /// API version header, used by Anthropic
    pub api_version: String,
}

impl ProviderConfig {
    /// Creates a configuration for OpenAI.
    ///
    /// An empty key is replaced with the [`API_KEY_NOT_SET`] placeholder.
    ///
    /// # Examples
    ///
    /// ```
    /// use partwise::llm::ProviderConfig;
    ///
    /// let config = ProviderConfig::openai("sk-...");
    /// assert_eq!(config.base_url, "https://api.openai.com/v1");
    /// ```
    #[must_use]
    pub fn openai(api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        Self {
            api_key: if api_key.is_empty() {
                API_KEY_NOT_SET.to_string()
            } else {
                api_key
            },
            base_url: OPENAI_BASE_URL.to_string(),
            timeout: Duration::from_secs(600),
            max_tokens: 4096,
            api_version: String::new(),
        }
    }

    /// Creates a configuration for Anthropic.
    #[must_use]
    pub fn anthropic(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            timeout: Duration::from_secs(600),
            max_tokens: 4096,
            api_version: "2023-06-01".to_string(),
        }
    }

    /// Creates a configuration for DeepSeek.
    ///
    /// # Errors
    ///
    /// DeepSeek requires a key; an empty one is a configuration error.
    pub fn deepseek(api_key: impl Into<String>) -> Result<Self, ModelError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ModelError::configuration(
                "api_key",
                "DeepSeek requires an API key; set DEEPSEEK_API_KEY",
            ));
        }
        Ok(Self {
            api_key,
            base_url: DEEPSEEK_BASE_URL.to_string(),
            ..Self::openai("")
        })
    }

    /// Creates a configuration for a local Ollama server.
    ///
    /// Ollama runs locally and does not require an API key.
    #[must_use]
    pub fn ollama() -> Self {
        Self::openai_compatible(OLLAMA_BASE_URL)
    }

    /// Creates a configuration for any OpenAI-compatible endpoint.
    ///
    /// # Examples
    ///
    /// ```
    /// use partwise::llm::ProviderConfig;
    ///
    /// let config = ProviderConfig::openai_compatible("http://localhost:8080/v1");
    /// assert_eq!(config.base_url, "http://localhost:8080/v1");
    /// ```
    #[must_use]
    pub fn openai_compatible(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(300),
            ..Self::openai("")
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Sets the base URL for the API.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the default output token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Returns true if a real key is configured.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty() && self.api_key != API_KEY_NOT_SET
    }

    /// Checks that the configuration can be used to build a client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the base URL is not an absolute
    /// http(s) URL or `max_tokens` is zero.
    pub fn validate(&self) -> Result<(), ModelError> {
        let url = url::Url::parse(&self.base_url).map_err(|e| {
            ModelError::configuration("base_url", format!("'{}' is not a URL: {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ModelError::configuration(
                "base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if self.max_tokens == 0 {
            return Err(ModelError::configuration(
                "max_tokens",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Joins a path onto the base URL.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
