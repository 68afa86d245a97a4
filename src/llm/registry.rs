//! Model name resolution.
//!
//! Turns strings like `openai:gpt-4o` or `claude-3-5-sonnet-latest` into a
//! ready-to-use [`KnownModel`].

use crate::llm::anthropic::AnthropicModel;
use crate::llm::client::{Model, ModelRequestParameters, ModelSettings};
use crate::llm::config::{ProviderConfig, OLLAMA_BASE_URL};
use crate::llm::error::ModelError;
use crate::llm::openai::OpenAIModel;
use crate::llm::streaming::StreamedResponse;
use crate::llm::test_model::TestModel;
use crate::llm::usage::Usage;
use crate::messages::{ModelMessage, ModelResponse};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// Groq's OpenAI-compatible endpoint.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Mistral's chat completions endpoint.
pub const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";

/// Gemini's OpenAI-compatible endpoint on the Generative Language API.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Cohere's OpenAI compatibility endpoint.
pub const COHERE_BASE_URL: &str = "https://api.cohere.ai/compatibility/v1";

/// A provider that model names can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownProvider {
    /// OpenAI
    OpenAI,
    /// DeepSeek, over the OpenAI protocol
    DeepSeek,
    /// Anthropic
    Anthropic,
    /// Gemini on the Generative Language API
    GoogleGla,
    /// Gemini on Vertex AI
    GoogleVertex,
    /// Groq
    Groq,
    /// Mistral
    Mistral,
    /// Cohere
    Cohere,
    /// A local Ollama server
    Ollama,
}

impl KnownProvider {
    /// Every provider, in display order.
    pub const ALL: [Self; 9] = [
        Self::OpenAI,
        Self::DeepSeek,
        Self::Anthropic,
        Self::GoogleGla,
        Self::GoogleVertex,
        Self::Groq,
        Self::Mistral,
        Self::Cohere,
        Self::Ollama,
    ];

    /// Returns the provider prefix used in model names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::DeepSeek => "deepseek",
            Self::Anthropic => "anthropic",
            Self::GoogleGla => "google-gla",
            Self::GoogleVertex => "google-vertex",
            Self::Groq => "groq",
            Self::Mistral => "mistral",
            Self::Cohere => "cohere",
            Self::Ollama => "ollama",
        }
    }

    /// Returns the environment variable the API key is read from.
    #[must_use]
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::GoogleGla => Some("GEMINI_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::Mistral => Some("MISTRAL_API_KEY"),
            Self::Cohere => Some("CO_API_KEY"),
            Self::GoogleVertex | Self::Ollama => None,
        }
    }

    /// Infers the provider from a bare model name.
    ///
    /// Only the legacy prefixes are recognised: `gpt`, `o1` and `o3` for
    /// OpenAI, `claude` for Anthropic, `gemini` for the Generative Language
    /// API and `vertexai` for Vertex AI.
    #[must_use]
    pub fn from_legacy_prefix(model_name: &str) -> Option<Self> {
        if ["gpt", "o1", "o3"].iter().any(|p| model_name.starts_with(p)) {
            Some(Self::OpenAI)
        } else if model_name.starts_with("claude") {
            Some(Self::Anthropic)
        } else if model_name.starts_with("gemini") {
            Some(Self::GoogleGla)
        } else if model_name.starts_with("vertexai") {
            Some(Self::GoogleVertex)
        } else {
            None
        }
    }

    /// Builds the default connection settings, reading the key through `env`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the provider requires a key and none
    /// is set, or if the provider has no HTTP transport.
    pub fn config_from_env<F>(self, env: F) -> Result<ProviderConfig, ModelError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = self.api_key_env().and_then(&env).unwrap_or_default();
        let require_key = |config: ProviderConfig| {
            if key.is_empty() {
                Err(ModelError::configuration(
                    "api_key",
                    format!(
                        "{} requires an API key; set {}",
                        self.as_str(),
                        self.api_key_env().unwrap_or("an API key")
                    ),
                ))
            } else {
                Ok(config.with_api_key(key.clone()))
            }
        };

        match self {
            Self::OpenAI => Ok(ProviderConfig::openai(key.clone())),
            Self::DeepSeek => ProviderConfig::deepseek(key.clone()),
            Self::Anthropic => require_key(ProviderConfig::anthropic("")),
            Self::GoogleGla => require_key(ProviderConfig::openai_compatible(GEMINI_BASE_URL)),
            Self::Groq => require_key(ProviderConfig::openai_compatible(GROQ_BASE_URL)),
            Self::Mistral => require_key(ProviderConfig::openai_compatible(MISTRAL_BASE_URL)),
            Self::Cohere => require_key(ProviderConfig::openai_compatible(COHERE_BASE_URL)),
            Self::Ollama => Ok(ProviderConfig::openai_compatible(
                env("OLLAMA_BASE_URL").unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            )),
            Self::GoogleVertex => Err(ModelError::configuration(
                "provider",
                "google-vertex has no HTTP transport; use google-gla",
            )),
        }
    }
}

impl fmt::Display for KnownProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnownProvider {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "vertexai" {
            return Ok(Self::GoogleVertex);
        }
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ModelError::configuration("model", format!("unknown provider: {s}")))
    }
}

/// A parsed model name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelKind {
    /// The in-process [`TestModel`]
    Test,
    /// A model served by a provider
    Provider {
        /// Resolved provider
        provider: KnownProvider,
        /// Model name sent to the provider
        model_name: String,
    },
}

impl ModelKind {
    /// Parses `provider:model`, a bare legacy model name, or `test`.
    ///
    /// The provider is split off at the first `:`, so model names may
    /// themselves contain colons (`ollama:llama3:8b`).
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown provider, an empty model
    /// name, or a bare name without a recognised prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use partwise::llm::{KnownProvider, ModelKind};
    ///
    /// let kind = ModelKind::parse("claude-3-5-haiku-latest").unwrap();
    /// assert_eq!(kind.provider(), Some(KnownProvider::Anthropic));
    /// ```
    pub fn parse(name: &str) -> Result<Self, ModelError> {
        let name = name.trim();
        if name == "test" {
            return Ok(Self::Test);
        }
        let unknown = || ModelError::configuration("model", format!("unknown model: {name}"));

        let (provider, model_name) = match name.split_once(':') {
            Some((provider, model_name)) => (provider.parse::<KnownProvider>()?, model_name),
            None => (KnownProvider::from_legacy_prefix(name).ok_or_else(unknown)?, name),
        };
        if model_name.is_empty() {
            return Err(unknown());
        }
        Ok(Self::Provider {
            provider,
            model_name: model_name.to_string(),
        })
    }

    /// Returns the provider, or `None` for the test model.
    #[must_use]
    pub fn provider(&self) -> Option<KnownProvider> {
        match self {
            Self::Test => None,
            Self::Provider { provider, .. } => Some(*provider),
        }
    }

    /// Returns the model name sent to the provider.
    #[must_use]
    pub fn model_name(&self) -> &str {
        match self {
            Self::Test => "test",
            Self::Provider { model_name, .. } => model_name,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Test => f.write_str("test"),
            Self::Provider {
                provider,
                model_name,
            } => write!(f, "{provider}:{model_name}"),
        }
    }
}

/// A model known to the registry.
#[derive(Debug, Clone)]
pub enum KnownModel {
    /// OpenAI or an OpenAI-compatible provider
    OpenAI(OpenAIModel),
    /// Anthropic
    Anthropic(AnthropicModel),
    /// In-process test model
    Test(TestModel),
}

impl KnownModel {
    /// Builds the model for a parsed name with explicit connection settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the settings are invalid for the
    /// provider.
    pub fn build(kind: &ModelKind, config: ProviderConfig) -> Result<Self, ModelError> {
        let ModelKind::Provider {
            provider,
            model_name,
        } = kind
        else {
            return Ok(Self::Test(TestModel::new()));
        };

        match provider {
            KnownProvider::Anthropic => Ok(Self::Anthropic(AnthropicModel::new(
                model_name.clone(),
                config,
            )?)),
            KnownProvider::GoogleVertex => Err(ModelError::unsupported_operation(
                "requests",
                "GeminiModel (google-vertex)",
            )),
            other => Ok(Self::OpenAI(
                OpenAIModel::new(model_name.clone(), config)?.with_system(other.as_str()),
            )),
        }
    }

    fn inner(&self) -> &dyn Model {
        match self {
            Self::OpenAI(model) => model,
            Self::Anthropic(model) => model,
            Self::Test(model) => model,
        }
    }
}

#[async_trait]
impl Model for KnownModel {
    async fn request(
        &self,
        messages: &[ModelMessage],
        settings: Option<&ModelSettings>,
        parameters: &ModelRequestParameters,
    ) -> Result<(ModelResponse, Usage), ModelError> {
        self.inner().request(messages, settings, parameters).await
    }

    async fn request_stream(
        &self,
        messages: &[ModelMessage],
        settings: Option<&ModelSettings>,
        parameters: &ModelRequestParameters,
    ) -> Result<StreamedResponse, ModelError> {
        self.inner()
            .request_stream(messages, settings, parameters)
            .await
    }

    fn model_name(&self) -> &str {
        self.inner().model_name()
    }

    fn system(&self) -> &str {
        self.inner().system()
    }

    fn variant_name(&self) -> &'static str {
        self.inner().variant_name()
    }

    fn base_url(&self) -> Option<&str> {
        self.inner().base_url()
    }
}

/// Resolves a model name, reading API keys from the process environment.
///
/// # Errors
///
/// Returns a configuration error if the name cannot be resolved or a
/// required API key is missing.
pub fn infer_model(name: &str) -> Result<KnownModel, ModelError> {
    infer_model_with(name, |key| std::env::var(key).ok())
}

/// Resolves a model name, reading API keys through `env`.
///
/// # Errors
///
/// See [`infer_model`].
pub fn infer_model_with<F>(name: &str, env: F) -> Result<KnownModel, ModelError>
where
    F: Fn(&str) -> Option<String>,
{
    let kind = ModelKind::parse(name)?;
    let config = match kind.provider() {
        Some(provider) => provider.config_from_env(env)?,
        None => return Ok(KnownModel::Test(TestModel::new())),
    };
    tracing::debug!(model = %kind, base_url = %config.base_url, "resolved model");
    KnownModel::build(&kind, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::config::API_KEY_NOT_SET;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_provider_prefix() {
        let kind = ModelKind::parse("openai:gpt-4o").unwrap();
        assert_eq!(kind.provider(), Some(KnownProvider::OpenAI));
        assert_eq!(kind.model_name(), "gpt-4o");
        assert_eq!(kind.to_string(), "openai:gpt-4o");
    }

    #[test]
    fn legacy_prefixes() {
        let cases = [
            ("gpt-4o", KnownProvider::OpenAI),
            ("o1-mini", KnownProvider::OpenAI),
            ("o3-mini", KnownProvider::OpenAI),
            ("claude-3-opus-latest", KnownProvider::Anthropic),
            ("gemini-1.5-flash", KnownProvider::GoogleGla),
            ("vertexai-gemini", KnownProvider::GoogleVertex),
        ];
        for (name, provider) in cases {
            let kind = ModelKind::parse(name).unwrap();
            assert_eq!(kind.provider(), Some(provider), "{name}");
            assert_eq!(kind.model_name(), name);
        }
    }

    #[test]
    fn vertexai_aliases_google_vertex() {
        let kind = ModelKind::parse("vertexai:gemini-1.5-pro").unwrap();
        assert_eq!(kind.provider(), Some(KnownProvider::GoogleVertex));
    }

    #[test]
    fn splits_at_first_colon() {
        let kind = ModelKind::parse("ollama:llama3:8b").unwrap();
        assert_eq!(kind.provider(), Some(KnownProvider::Ollama));
        assert_eq!(kind.model_name(), "llama3:8b");
    }

    #[test]
    fn unknown_names_are_configuration_errors() {
        for name in ["llama3", "acme:model", "openai:", ""] {
            let error = ModelKind::parse(name).unwrap_err();
            assert!(error.is_configuration(), "{name}");
        }
    }

    #[test]
    fn test_model_needs_no_environment() {
        let model = infer_model_with("test", env(&[])).unwrap();
        assert!(matches!(model, KnownModel::Test(_)));
        assert_eq!(model.model_name(), "test");
    }

    #[test]
    fn openai_without_key_uses_placeholder() {
        let model = infer_model_with("openai:gpt-4o", env(&[])).unwrap();
        let KnownModel::OpenAI(inner) = &model else {
            panic!("expected OpenAI model");
        };
        assert_eq!(inner.config().api_key, API_KEY_NOT_SET);
        assert_eq!(model.system(), "openai");
    }

    #[test]
    fn deepseek_shares_openai_interface() {
        let model = infer_model_with("deepseek:deepseek-chat", env(&[("DEEPSEEK_API_KEY", "sk")])).unwrap();
        assert_eq!(model.variant_name(), "OpenAIModel");
        assert_eq!(model.system(), "deepseek");
        assert_eq!(model.base_url(), Some(crate::llm::config::DEEPSEEK_BASE_URL));
    }

    #[test]
    fn hosted_providers_require_keys() {
        for name in ["anthropic:claude-3-5-haiku-latest", "groq:llama-3.3-70b", "deepseek:deepseek-chat"] {
            let error = infer_model_with(name, env(&[])).unwrap_err();
            assert!(error.is_configuration(), "{name}");
        }
    }

    #[test]
    fn compatible_providers_use_their_endpoints() {
        let model = infer_model_with(
            "google-gla:gemini-1.5-flash",
            env(&[("GEMINI_API_KEY", "g")]),
        )
        .unwrap();
        assert_eq!(model.system(), "google-gla");
        assert_eq!(model.base_url(), Some(GEMINI_BASE_URL));

        let model = infer_model_with("mistral:mistral-large-latest", env(&[("MISTRAL_API_KEY", "m")])).unwrap();
        assert_eq!(model.base_url(), Some(MISTRAL_BASE_URL));
    }

    #[test]
    fn ollama_base_url_from_environment() {
        let model = infer_model_with(
            "ollama:llama3",
            env(&[("OLLAMA_BASE_URL", "http://gpu-box:11434/v1")]),
        )
        .unwrap();
        assert_eq!(model.base_url(), Some("http://gpu-box:11434/v1"));
    }

    #[test]
    fn google_vertex_is_unwired() {
        let error = infer_model_with("vertexai:gemini-1.5-pro", env(&[])).unwrap_err();
        assert!(error.is_configuration());
    }
}
