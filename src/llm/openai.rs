//! OpenAI-compatible chat completions model.
//!
//! HTTP model for OpenAI and every endpoint that speaks the same chat
//! completions protocol (DeepSeek, Ollama, vLLM, Groq, Mistral and others),
//! plus the decoder that turns its streamed chunks into deltas.

use crate::llm::client::{Model, ModelRequestParameters, ModelSettings, ToolDefinition};
use crate::llm::config::ProviderConfig;
use crate::llm::error::ModelError;
use crate::llm::gate::check_allow_model_requests;
use crate::llm::parts::DeltaEvent;
use crate::llm::sse::{sse_frames, SseFrame};
use crate::llm::streaming::{
    decode_stream, DecodedEvent, EventDecoder, RawEventStream, StreamedResponse,
};
use crate::llm::usage::Usage;
use crate::messages::{
    ModelMessage, ModelResponse, Part, RequestPart, TextPart, ToolArgsDelta, ToolCallArgs,
    ToolCallPart,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Vendor id OpenAI's single text part is tracked under.
const TEXT_VENDOR_ID: &str = "content";

/// Role used to send system prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemPromptRole {
    /// `system`
    #[default]
    System,
    /// `developer`, required by some reasoning models
    Developer,
    /// `user`, for servers without a system role
    User,
}

impl SystemPromptRole {
    fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Developer => "developer",
            Self::User => "user",
        }
    }
}

/// Request body for the chat completions API.
#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

/// A message in OpenAI format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAIMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::text("tool", content)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OpenAIFunction,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

/// Non-streaming response.
#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    created: i64,
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionChoice {
    message: OpenAIMessage,
}

/// Streaming chunk.
#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    created: i64,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallChunk>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolCallChunk {
    index: u64,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionChunk>,
}

#[derive(Debug, Clone, Deserialize)]
struct FunctionChunk {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens_details: Option<Map<String, Value>>,
    #[serde(default)]
    prompt_tokens_details: Option<Map<String, Value>>,
}

impl From<OpenAIUsage> for Usage {
    fn from(usage: OpenAIUsage) -> Self {
        let mut mapped = Usage {
            requests: 0,
            request_tokens: usage.prompt_tokens,
            response_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            ..Usage::default()
        };
        let details = usage
            .completion_tokens_details
            .into_iter()
            .chain(usage.prompt_tokens_details)
            .flatten();
        for (key, value) in details {
            if let Some(count) = value.as_u64() {
                mapped.details.insert(key, count);
            }
        }
        mapped
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

/// Decodes chat completions SSE frames.
///
/// Text is tracked under the vendor id `"content"`; each tool call under its
/// integer `index`. Chunks without choices only carry usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAIStreamDecoder;

impl OpenAIStreamDecoder {
    fn parse(&self, frame: &SseFrame) -> Result<Option<ChatCompletionChunk>, ModelError> {
        if frame.is_done() || frame.data.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&frame.data)
            .map(Some)
            .map_err(|e| ModelError::upstream_decode(self.provider(), e.to_string()))
    }

    fn decode_chunk(chunk: ChatCompletionChunk) -> Vec<DecodedEvent> {
        let mut events = Vec::new();
        if let Some(usage) = chunk.usage {
            events.push(DecodedEvent::Usage(usage.into()));
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return events;
        };

        if let Some(content) = choice.delta.content {
            events.push(DeltaEvent::text(TEXT_VENDOR_ID, content).into());
        }
        for call in choice.delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = match call.function {
                Some(function) => (function.name, function.arguments),
                None => (None, None),
            };
            events.push(
                DeltaEvent::tool_call(
                    call.index,
                    name,
                    arguments.map(ToolArgsDelta::Fragment),
                    call.id,
                )
                .into(),
            );
        }
        events
    }
}

impl EventDecoder for OpenAIStreamDecoder {
    type Chunk = SseFrame;

    fn provider(&self) -> &'static str {
        "openai"
    }

    fn decode(&mut self, frame: SseFrame) -> Result<Vec<DecodedEvent>, ModelError> {
        Ok(self
            .parse(&frame)?
            .map(Self::decode_chunk)
            .unwrap_or_default())
    }
}

fn timestamp_from(created: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(created, 0).unwrap_or_else(Utc::now)
}

/// Builds a streamed response from chat completions SSE frames.
///
/// The first chunk is read before returning: its `created` field fixes the
/// response timestamp.
///
/// # Errors
///
/// Returns `UnexpectedModelBehavior` if the stream ends before its first
/// chunk, or the transport or decode error that ended it.
pub async fn open_stream(
    model_name: impl Into<String>,
    mut frames: RawEventStream<SseFrame>,
) -> Result<StreamedResponse, ModelError> {
    let decoder = OpenAIStreamDecoder;
    let first = loop {
        match frames.next().await {
            None => {
                return Err(ModelError::unexpected_model_behavior(
                    "streamed response ended without content or tool calls",
                ))
            }
            Some(Err(e)) => return Err(e),
            Some(Ok(frame)) => {
                if let Some(chunk) = decoder.parse(&frame)? {
                    break chunk;
                }
            }
        }
    };

    let timestamp = timestamp_from(first.created);
    let mut head = vec![DecodedEvent::Usage(Usage::new().with_requests(1))];
    head.extend(OpenAIStreamDecoder::decode_chunk(first));

    let stream = futures::stream::once(async move { Ok(head) }).chain(decode_stream(frames, decoder));
    Ok(StreamedResponse::new(model_name, timestamp, Box::pin(stream)))
}

/// A model served over the OpenAI chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAIModel {
    client: Client,
    config: ProviderConfig,
    model_name: String,
    system: String,
    system_prompt_role: SystemPromptRole,
}

impl OpenAIModel {
    /// Creates a model for `model_name` on the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config is invalid, or a transport
    /// error if the HTTP client cannot be created.
    pub fn new(model_name: impl Into<String>, config: ProviderConfig) -> Result<Self, ModelError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            model_name: model_name.into(),
            system: "openai".to_string(),
            system_prompt_role: SystemPromptRole::default(),
        })
    }

    /// Sets the provider system name reported in telemetry, e.g. `deepseek`.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// Sets the role system prompts are sent with.
    #[must_use]
    pub fn with_system_prompt_role(mut self, role: SystemPromptRole) -> Self {
        self.system_prompt_role = role;
        self
    }

    /// Returns the provider configuration.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn map_messages(&self, messages: &[ModelMessage]) -> Vec<OpenAIMessage> {
        let mut mapped = Vec::new();
        for message in messages {
            match message {
                ModelMessage::Request(request) => {
                    mapped.extend(request.parts.iter().map(|part| self.map_request_part(part)));
                }
                ModelMessage::Response(response) => mapped.push(map_response(response)),
            }
        }
        mapped
    }

    fn map_request_part(&self, part: &RequestPart) -> OpenAIMessage {
        match part {
            RequestPart::SystemPrompt { content } => {
                OpenAIMessage::text(self.system_prompt_role.as_str(), content.clone())
            }
            RequestPart::UserPrompt { content, .. } => OpenAIMessage::text("user", content.clone()),
            RequestPart::ToolReturn { tool_call_id, .. } => {
                OpenAIMessage::tool(tool_call_id.clone(), part.model_text())
            }
            RequestPart::RetryPrompt {
                tool_name: None, ..
            } => OpenAIMessage::text("user", part.model_text()),
            RequestPart::RetryPrompt { tool_call_id, .. } => {
                OpenAIMessage::tool(tool_call_id.clone().unwrap_or_default(), part.model_text())
            }
        }
    }

    fn build_request(
        &self,
        messages: &[ModelMessage],
        settings: Option<&ModelSettings>,
        parameters: &ModelRequestParameters,
        stream: bool,
    ) -> ChatCompletionRequest {
        let defaults = ModelSettings::default();
        let settings = settings.unwrap_or(&defaults);
        let tools: Vec<OpenAITool> = parameters.all_tools().map(map_tool).collect();
        let tool_choice = if tools.is_empty() {
            None
        } else if parameters.allow_text_result {
            Some("auto")
        } else {
            Some("required")
        };

        ChatCompletionRequest {
            model: self.model_name.clone(),
            messages: self.map_messages(messages),
            n: 1,
            tools: if tools.is_empty() { None } else { Some(tools) },
            tool_choice,
            parallel_tool_calls: settings.parallel_tool_calls,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
            max_tokens: settings
                .max_tokens
                .or(Some(u64::from(self.config.max_tokens))),
            temperature: settings.temperature,
            top_p: settings.top_p,
            seed: settings.seed,
            presence_penalty: settings.presence_penalty,
            frequency_penalty: settings.frequency_penalty,
        }
    }

    async fn send(
        &self,
        body: &ChatCompletionRequest,
        settings: Option<&ModelSettings>,
    ) -> Result<reqwest::Response, ModelError> {
        let mut request = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .header("content-type", "application/json")
            .bearer_auth(&self.config.api_key)
            .json(body);
        if let Some(timeout) = settings.and_then(|s| s.timeout) {
            request = request.timeout(Duration::from_secs_f64(timeout));
        }

        tracing::debug!(model = %self.model_name, system = %self.system, stream = body.stream, "sending chat completion request");
        let response = request
            .send()
            .await
            .map_err(|e| ModelError::transport(format!("request failed: {e}")))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(parse_error_response(response).await)
        }
    }
}

fn map_tool(tool: &ToolDefinition) -> OpenAITool {
    OpenAITool {
        tool_type: "function",
        function: OpenAIFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters_json_schema.clone(),
        },
    }
}

fn map_response(response: &ModelResponse) -> OpenAIMessage {
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();
    for part in &response.parts {
        match part {
            Part::Text(text) => texts.push(text.content.clone()),
            Part::ToolCall(call) => tool_calls.push(OpenAIToolCall {
                id: call.tool_call_id.clone(),
                call_type: "function".to_string(),
                function: OpenAIFunctionCall {
                    name: call.tool_name.clone(),
                    arguments: call.args_as_json_str(),
                },
            }),
            Part::Thinking(_) => {}
        }
    }
    OpenAIMessage {
        role: "assistant".to_string(),
        content: if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n\n"))
        },
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        tool_call_id: None,
    }
}

async fn parse_error_response(response: reqwest::Response) -> ModelError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<OpenAIErrorResponse>(&body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) => body,
    };
    ModelError::api(status.as_u16(), message)
}

fn process_response(model_name: &str, response: ChatCompletionResponse) -> (ModelResponse, Usage) {
    let timestamp = timestamp_from(response.created);
    let mut parts = Vec::new();
    if let Some(choice) = response.choices.into_iter().next() {
        if let Some(content) = choice.message.content {
            parts.push(Part::from(TextPart::new(content)));
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            parts.push(Part::from(ToolCallPart::new(
                call.function.name,
                ToolCallArgs::Json(call.function.arguments),
                call.id,
            )));
        }
    }
    let usage = response.usage.map(Usage::from).unwrap_or_default().with_requests(1);
    (ModelResponse::new(parts, model_name, timestamp), usage)
}

#[async_trait]
impl Model for OpenAIModel {
    async fn request(
        &self,
        messages: &[ModelMessage],
        settings: Option<&ModelSettings>,
        parameters: &ModelRequestParameters,
    ) -> Result<(ModelResponse, Usage), ModelError> {
        check_allow_model_requests()?;
        let body = self.build_request(messages, settings, parameters, false);
        let response = self.send(&body, settings).await?;
        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::upstream_decode("openai", format!("failed to parse response: {e}")))?;
        Ok(process_response(&self.model_name, completion))
    }

    async fn request_stream(
        &self,
        messages: &[ModelMessage],
        settings: Option<&ModelSettings>,
        parameters: &ModelRequestParameters,
    ) -> Result<StreamedResponse, ModelError> {
        check_allow_model_requests()?;
        let body = self.build_request(messages, settings, parameters, true);
        let response = self.send(&body, settings).await?;
        open_stream(self.model_name.clone(), sse_frames(response)).await
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn system(&self) -> &str {
        &self.system
    }

    fn variant_name(&self) -> &'static str {
        "OpenAIModel"
    }

    fn base_url(&self) -> Option<&str> {
        Some(&self.config.base_url)
    }
}
