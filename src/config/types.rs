//! Configuration types.
//!
//! These types map directly onto the TOML configuration file:
//!
//! ```toml
//! default_model = "anthropic:claude-sonnet-4-20250514"
//!
//! [providers.ollama]
//! base_url = "http://gpu-box:11434/v1"
//! timeout_secs = 300
//!
//! [providers.openai]
//! api_key_env = "WORK_OPENAI_KEY"
//!
//! [instrumentation]
//! enabled = true
//! event_mode = "logs"
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::ConfigError;
use crate::llm::{
    EventMode, KnownModel, KnownProvider, ModelError, ModelKind, ProviderConfig, TestModel,
};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Root configuration loaded from `partwise.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartwiseConfig {
    /// Model used when none is given on the command line
    pub default_model: Option<String>,

    /// Per-provider overrides, keyed by provider name (`openai`, `ollama`, ...)
    pub providers: BTreeMap<String, ProviderOverride>,

    /// Request instrumentation settings
    pub instrumentation: InstrumentationConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl PartwiseConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default model name.
    #[must_use]
    pub fn with_default_model(mut self, name: impl Into<String>) -> Self {
        self.default_model = Some(name.into());
        self
    }

    /// Adds an override for a provider.
    #[must_use]
    pub fn with_provider(mut self, provider: KnownProvider, value: ProviderOverride) -> Self {
        self.providers.insert(provider.as_str().to_string(), value);
        self
    }

    /// Returns true if nothing beyond the defaults is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Returns the override for a provider, if one is configured.
    #[must_use]
    pub fn provider(&self, provider: KnownProvider) -> Option<&ProviderOverride> {
        self.providers.get(provider.as_str())
    }

    /// Checks provider names and numeric limits.
    ///
    /// # Errors
    ///
    /// Returns an invalid value error naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in &self.providers {
            let field = |key: &str| format!("providers.{name}.{key}");
            name.parse::<KnownProvider>()
                .map_err(|_| ConfigError::invalid_value(format!("providers.{name}"), "unknown provider"))?;
            if value.timeout_secs == Some(0) {
                return Err(ConfigError::invalid_value(
                    field("timeout_secs"),
                    "must be greater than zero",
                ));
            }
            if value.max_tokens == Some(0) {
                return Err(ConfigError::invalid_value(
                    field("max_tokens"),
                    "must be greater than zero",
                ));
            }
            if value.api_key_env.as_deref() == Some("") {
                return Err(ConfigError::invalid_value(
                    field("api_key_env"),
                    "must name an environment variable",
                ));
            }
        }
        if self.default_model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(ConfigError::invalid_value("default_model", "must not be empty"));
        }
        Ok(())
    }

    /// Builds connection settings for a provider, reading keys through `env`.
    ///
    /// An override's `api_key_env` replaces the provider's usual variable.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a required key is missing.
    pub fn provider_config_with<F>(
        &self,
        provider: KnownProvider,
        env: F,
    ) -> Result<ProviderConfig, ModelError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = self.provider(provider);
        let custom_key_env = value.and_then(|v| v.api_key_env.as_deref());
        let lookup = |key: &str| match custom_key_env {
            Some(custom) if Some(key) == provider.api_key_env() => env(custom),
            _ => env(key),
        };
        let mut config = provider.config_from_env(lookup)?;
        // keyless providers still send a key when one is configured
        if provider.api_key_env().is_none() {
            if let Some(key) = custom_key_env.and_then(&env) {
                config = config.with_api_key(key);
            }
        }
        Ok(match value {
            Some(value) => value.apply(config),
            None => config,
        })
    }

    /// Resolves a model name (or the configured default) to a model.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no model is named, the name cannot
    /// be parsed, or the provider settings are incomplete.
    pub fn resolve_model(&self, name: Option<&str>) -> Result<KnownModel, ModelError> {
        self.resolve_model_with(name, |key| std::env::var(key).ok())
    }

    /// Like [`resolve_model`](Self::resolve_model), reading keys through `env`.
    ///
    /// # Errors
    ///
    /// See [`resolve_model`](Self::resolve_model).
    pub fn resolve_model_with<F>(&self, name: Option<&str>, env: F) -> Result<KnownModel, ModelError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = name.or(self.default_model.as_deref()).ok_or_else(|| {
            ModelError::configuration(
                "model",
                "no model given and no default_model configured",
            )
        })?;
        let kind = ModelKind::parse(name)?;
        let Some(provider) = kind.provider() else {
            return Ok(KnownModel::Test(TestModel::new()));
        };
        let config = self.provider_config_with(provider, env)?;
        tracing::debug!(model = %kind, base_url = %config.base_url, "resolved model from config");
        KnownModel::build(&kind, config)
    }
}

/// Settings that replace a provider's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOverride {
    /// Base URL replacing the provider's default endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Request timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Output token limit used when a request does not set one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ProviderOverride {
    /// Creates an empty override.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the environment variable for the API key.
    #[must_use]
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    /// Sets the request timeout in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Sets the default output token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Applies the set fields on top of `config`.
    #[must_use]
    pub fn apply(&self, mut config: ProviderConfig) -> ProviderConfig {
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.clone());
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(max_tokens) = self.max_tokens {
            config = config.with_max_tokens(max_tokens);
        }
        config
    }
}

/// Request instrumentation settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    /// Wrap resolved models in an instrumented model
    pub enabled: bool,

    /// How message events are recorded
    pub event_mode: EventMode,
}
