//! Model trait abstraction.
//!
//! This module defines the [`Model`] trait shared by every provider model and
//! the request inputs it takes.

use crate::llm::error::ModelError;
use crate::llm::streaming::StreamedResponse;
use crate::llm::usage::Usage;
use crate::messages::{ModelMessage, ModelResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-request model settings.
///
/// Every field is optional; a model ignores settings it does not support.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling probability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Random seed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Presence penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Frequency penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// Request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    /// Whether the model may call several tools at once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

impl ModelSettings {
    /// Returns the numeric settings reported as telemetry attributes.
    ///
    /// Only `max_tokens`, `top_p`, `seed`, `temperature`, `presence_penalty`
    /// and `frequency_penalty` are reported, and only when set.
    #[must_use]
    pub fn numeric_attributes(&self) -> Vec<(&'static str, Value)> {
        let mut attributes = Vec::new();
        if let Some(v) = self.max_tokens {
            attributes.push(("max_tokens", Value::from(v)));
        }
        if let Some(v) = self.top_p {
            attributes.push(("top_p", Value::from(v)));
        }
        if let Some(v) = self.seed {
            attributes.push(("seed", Value::from(v)));
        }
        if let Some(v) = self.temperature {
            attributes.push(("temperature", Value::from(v)));
        }
        if let Some(v) = self.presence_penalty {
            attributes.push(("presence_penalty", Value::from(v)));
        }
        if let Some(v) = self.frequency_penalty {
            attributes.push(("frequency_penalty", Value::from(v)));
        }
        attributes
    }
}

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// What the tool does
    pub description: String,
    /// JSON schema of the tool's arguments
    pub parameters_json_schema: Value,
}

impl ToolDefinition {
    /// Creates a tool definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_json_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_json_schema,
        }
    }
}

/// Tool and result configuration for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequestParameters {
    /// Tools the model may call
    pub function_tools: Vec<ToolDefinition>,
    /// Whether a plain text reply is an acceptable result
    pub allow_text_result: bool,
    /// Tools whose call is the final result
    pub result_tools: Vec<ToolDefinition>,
}

impl Default for ModelRequestParameters {
    fn default() -> Self {
        Self {
            function_tools: Vec::new(),
            allow_text_result: true,
            result_tools: Vec::new(),
        }
    }
}

impl ModelRequestParameters {
    /// Returns function tools followed by result tools.
    pub fn all_tools(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.function_tools.iter().chain(self.result_tools.iter())
    }
}

/// A language model.
///
/// Streaming is optional: the default `request_stream` fails with
/// `UnsupportedOperation` naming the concrete model.
///
/// # Example
///
/// ```ignore
/// use partwise::llm::{infer_model, Model, ModelRequestParameters};
/// use partwise::messages::{ModelMessage, ModelRequest};
///
/// let model = infer_model("openai:gpt-4o")?;
/// let messages = vec![ModelMessage::from(ModelRequest::user("Hello!"))];
/// let mut stream = model
///     .request_stream(&messages, None, &ModelRequestParameters::default())
///     .await?;
/// while let Some(event) = stream.next_event().await {
///     println!("{:?}", event?);
/// }
/// ```
#[async_trait]
pub trait Model: Send + Sync + std::fmt::Debug {
    /// Sends a request and waits for the complete response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is not allowed or fails.
    async fn request(
        &self,
        messages: &[ModelMessage],
        settings: Option<&ModelSettings>,
        parameters: &ModelRequestParameters,
    ) -> Result<(ModelResponse, Usage), ModelError>;

    /// Sends a request and returns the response as it streams.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` unless the model streams, or an error
    /// if the request is not allowed or fails to start.
    async fn request_stream(
        &self,
        messages: &[ModelMessage],
        settings: Option<&ModelSettings>,
        parameters: &ModelRequestParameters,
    ) -> Result<StreamedResponse, ModelError> {
        let _ = (messages, settings, parameters);
        Err(ModelError::unsupported_operation(
            "streamed requests",
            self.variant_name(),
        ))
    }

    /// Returns the model name sent to the provider.
    fn model_name(&self) -> &str;

    /// Returns the provider system name, e.g. `openai`.
    fn system(&self) -> &str;

    /// Returns the concrete model type name, e.g. `OpenAIModel`.
    fn variant_name(&self) -> &'static str;

    /// Returns the API base URL, if the model talks to one.
    fn base_url(&self) -> Option<&str> {
        None
    }
}

/// Drains a streamed response into a complete response and its usage.
///
/// # Errors
///
/// Returns the error that ended the stream.
pub async fn collect_stream(
    mut stream: StreamedResponse,
) -> Result<(ModelResponse, Usage), ModelError> {
    stream.ensure_exhausted().await?;
    Ok((stream.get(), stream.usage()))
}
