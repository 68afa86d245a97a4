//! Anthropic messages API model.
//!
//! HTTP model for the Anthropic messages API and the decoder for its SSE
//! stream. Content blocks are tracked under their integer block index.

use crate::llm::client::{Model, ModelRequestParameters, ModelSettings, ToolDefinition};
use crate::llm::config::ProviderConfig;
use crate::llm::error::ModelError;
use crate::llm::gate::check_allow_model_requests;
use crate::llm::parts::DeltaEvent;
use crate::llm::sse::{sse_frames, SseFrame};
use crate::llm::streaming::{decode_stream, DecodedEvent, EventDecoder, StreamedResponse};
use crate::llm::usage::Usage;
use crate::messages::{
    ModelMessage, ModelResponse, Part, RequestPart, TextPart, ThinkingPart, ToolArgsDelta,
    ToolCallArgs, ToolCallPart,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Request body for the messages API.
#[derive(Debug, Clone, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    stream: bool,
}

/// A message in the API format.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

/// A content block in the API format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: String,
    },
}

/// Tool definition in the API format.
#[derive(Debug, Clone, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

/// Response from the messages API (non-streaming).
#[derive(Debug, Clone, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
    usage: ApiUsage,
}

/// Usage block shared by responses, `message_start` and `message_delta`.
#[derive(Debug, Clone, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
}

impl ApiUsage {
    fn input_usage(&self) -> Usage {
        let input = self.input_tokens.unwrap_or(0);
        let mut usage = Usage {
            request_tokens: Some(input),
            total_tokens: Some(input),
            ..Usage::default()
        };
        if let Some(tokens) = self.cache_creation_input_tokens {
            usage.details.insert("cache_creation_input_tokens".into(), tokens);
        }
        if let Some(tokens) = self.cache_read_input_tokens {
            usage.details.insert("cache_read_input_tokens".into(), tokens);
        }
        usage
    }

    fn output_usage(&self) -> Usage {
        let output = self.output_tokens.unwrap_or(0);
        Usage {
            response_tokens: Some(output),
            total_tokens: Some(output),
            ..Usage::default()
        }
    }
}

/// Error response from the API.
#[derive(Debug, Clone, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

/// Error detail from the API.
#[derive(Debug, Clone, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

/// Raw SSE event data from the API.
#[derive(Debug, Clone, Deserialize)]
struct RawStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    index: Option<u64>,
    #[serde(default)]
    content_block: Option<ContentBlock>,
    #[serde(default)]
    delta: Option<Value>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMessage {
    #[serde(default)]
    usage: Option<ApiUsage>,
}

/// Decodes Anthropic messages SSE frames.
///
/// `message_start` reports input tokens and `message_delta` output tokens;
/// an `error` event fails the stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicStreamDecoder;

impl AnthropicStreamDecoder {
    fn block_index(&self, event: &RawStreamEvent) -> Result<u64, ModelError> {
        event.index.ok_or_else(|| {
            ModelError::upstream_decode(
                self.provider(),
                format!("{} event without an index", event.event_type),
            )
        })
    }

    fn block_start(&self, index: u64, block: ContentBlock) -> DeltaEvent {
        let part: Part = match block {
            ContentBlock::Text { text } => TextPart::new(text).into(),
            ContentBlock::Thinking {
                thinking,
                signature,
            } => ThinkingPart {
                content: thinking,
                signature: (!signature.is_empty()).then_some(signature),
            }
            .into(),
            ContentBlock::ToolUse { id, name, input } => {
                ToolCallPart::new(name, initial_args(&input), id).into()
            }
            ContentBlock::ToolResult { content, .. } => TextPart::new(content).into(),
        };
        DeltaEvent::part_start(index, part)
    }

    fn block_delta(&self, index: u64, delta: &Value) -> Result<Option<DeltaEvent>, ModelError> {
        let field = |name: &str| delta.get(name).and_then(Value::as_str).map(str::to_string);
        let delta_type = delta.get("type").and_then(Value::as_str).unwrap_or_default();
        let event = match delta_type {
            "text_delta" => field("text").map(|text| DeltaEvent::text(index, text)),
            "input_json_delta" => field("partial_json").map(|json| {
                DeltaEvent::tool_call(index, None, Some(ToolArgsDelta::Fragment(json)), None)
            }),
            "thinking_delta" => field("thinking").map(|text| DeltaEvent::thinking(index, text)),
            "signature_delta" => field("signature").map(|signature| DeltaEvent::ThinkingPartDelta {
                vendor_id: index.into(),
                content_delta: None,
                signature_delta: Some(signature),
            }),
            other => {
                tracing::debug!(delta_type = other, "ignoring unknown content block delta");
                None
            }
        };
        Ok(event)
    }
}

impl EventDecoder for AnthropicStreamDecoder {
    type Chunk = SseFrame;

    fn provider(&self) -> &'static str {
        "anthropic"
    }

    fn decode(&mut self, frame: SseFrame) -> Result<Vec<DecodedEvent>, ModelError> {
        if frame.data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let event: RawStreamEvent = serde_json::from_str(&frame.data)
            .map_err(|e| ModelError::upstream_decode(self.provider(), e.to_string()))?;

        let mut events = Vec::new();
        match event.event_type.as_str() {
            "message_start" => {
                if let Some(usage) = event.message.as_ref().and_then(|m| m.usage.as_ref()) {
                    events.push(DecodedEvent::Usage(usage.input_usage()));
                }
            }
            "message_delta" => {
                if let Some(usage) = &event.usage {
                    events.push(DecodedEvent::Usage(usage.output_usage()));
                }
            }
            "content_block_start" => {
                let index = self.block_index(&event)?;
                let block = event.content_block.ok_or_else(|| {
                    ModelError::upstream_decode(
                        self.provider(),
                        "content_block_start without a content block",
                    )
                })?;
                events.push(self.block_start(index, block).into());
            }
            "content_block_delta" => {
                let index = self.block_index(&event)?;
                if let Some(delta) = &event.delta {
                    events.extend(self.block_delta(index, delta)?.map(DecodedEvent::from));
                }
            }
            "error" => {
                let message = event.error.map_or_else(
                    || "unknown error".to_string(),
                    |e| format!("{}: {}", e.error_type, e.message),
                );
                return Err(ModelError::upstream_decode(self.provider(), message));
            }
            // ping, content_block_stop, message_stop
            _ => {}
        }
        Ok(events)
    }
}

fn initial_args(input: &Value) -> ToolCallArgs {
    match input {
        Value::Object(map) if map.is_empty() => ToolCallArgs::Json(String::new()),
        Value::Null => ToolCallArgs::Json(String::new()),
        other => ToolCallArgs::Json(other.to_string()),
    }
}

/// A model served over the Anthropic messages API.
#[derive(Debug, Clone)]
pub struct AnthropicModel {
    client: Client,
    config: ProviderConfig,
    model_name: String,
}

impl AnthropicModel {
    /// Creates a model for `model_name`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config is invalid or has no API
    /// key, or a transport error if the HTTP client cannot be created.
    pub fn new(model_name: impl Into<String>, config: ProviderConfig) -> Result<Self, ModelError> {
        config.validate()?;
        if !config.has_api_key() {
            return Err(ModelError::configuration(
                "api_key",
                "Anthropic requires an API key; set ANTHROPIC_API_KEY",
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            model_name: model_name.into(),
        })
    }

    /// Returns the provider configuration.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_request(
        &self,
        messages: &[ModelMessage],
        settings: Option<&ModelSettings>,
        parameters: &ModelRequestParameters,
        stream: bool,
    ) -> MessagesRequest {
        let defaults = ModelSettings::default();
        let settings = settings.unwrap_or(&defaults);
        let (system, messages) = map_messages(messages);
        let tools: Vec<ApiTool> = parameters.all_tools().map(map_tool).collect();
        let tool_choice = if tools.is_empty() {
            None
        } else if parameters.allow_text_result {
            Some(json!({"type": "auto"}))
        } else {
            Some(json!({"type": "any"}))
        };

        MessagesRequest {
            model: self.model_name.clone(),
            max_tokens: settings
                .max_tokens
                .unwrap_or(u64::from(self.config.max_tokens)),
            system,
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
            tool_choice,
            temperature: settings.temperature,
            top_p: settings.top_p,
            stream,
        }
    }

    async fn send(
        &self,
        body: &MessagesRequest,
        settings: Option<&ModelSettings>,
    ) -> Result<reqwest::Response, ModelError> {
        let mut request = self
            .client
            .post(self.config.endpoint("v1/messages"))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json")
            .json(body);
        if let Some(timeout) = settings.and_then(|s| s.timeout) {
            request = request.timeout(Duration::from_secs_f64(timeout));
        }

        tracing::debug!(model = %self.model_name, stream = body.stream, "sending messages request");
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

fn map_tool(tool: &ToolDefinition) -> ApiTool {
    ApiTool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.parameters_json_schema.clone(),
    }
}

/// Splits out system prompts and maps the rest to alternating messages.
fn map_messages(messages: &[ModelMessage]) -> (Option<String>, Vec<ApiMessage>) {
    let mut system = Vec::new();
    let mut mapped: Vec<ApiMessage> = Vec::new();
    let mut push = |role: &'static str, block: ContentBlock| match mapped.last_mut() {
        // consecutive blocks of one role must share a message
        Some(last) if last.role == role => last.content.push(block),
        _ => mapped.push(ApiMessage {
            role,
            content: vec![block],
        }),
    };

    for message in messages {
        match message {
            ModelMessage::Request(request) => {
                for part in &request.parts {
                    match part {
                        RequestPart::SystemPrompt { content } => system.push(content.clone()),
                        RequestPart::UserPrompt { content, .. } => push(
                            "user",
                            ContentBlock::Text {
                                text: content.clone(),
                            },
                        ),
                        RequestPart::ToolReturn { tool_call_id, .. } => push(
                            "user",
                            ContentBlock::ToolResult {
                                tool_use_id: tool_call_id.clone(),
                                content: part.model_text(),
                                is_error: false,
                            },
                        ),
                        RequestPart::RetryPrompt {
                            tool_name: None, ..
                        } => push(
                            "user",
                            ContentBlock::Text {
                                text: part.model_text(),
                            },
                        ),
                        RequestPart::RetryPrompt { tool_call_id, .. } => push(
                            "user",
                            ContentBlock::ToolResult {
                                tool_use_id: tool_call_id.clone().unwrap_or_default(),
                                content: part.model_text(),
                                is_error: true,
                            },
                        ),
                    }
                }
            }
            ModelMessage::Response(response) => {
                for part in &response.parts {
                    let block = match part {
                        Part::Text(text) => ContentBlock::Text {
                            text: text.content.clone(),
                        },
                        Part::ToolCall(call) => ContentBlock::ToolUse {
                            id: call.tool_call_id.clone(),
                            name: call.tool_name.clone(),
                            input: call
                                .args_as_map()
                                .map_or_else(|_| Value::Object(Map::new()), Value::Object),
                        },
                        Part::Thinking(thinking) => ContentBlock::Thinking {
                            thinking: thinking.content.clone(),
                            signature: thinking.signature.clone().unwrap_or_default(),
                        },
                    };
                    push("assistant", block);
                }
            }
        }
    }

    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, mapped)
}

async fn parse_error_response(response: reqwest::Response) -> ModelError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(parsed) => format!("{}: {}", parsed.error.error_type, parsed.error.message),
        Err(_) if body.is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) => body,
    };
    ModelError::api(status.as_u16(), message)
}

fn process_response(response: MessagesResponse) -> (ModelResponse, Usage) {
    let parts = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(TextPart::new(text).into()),
            ContentBlock::ToolUse { id, name, input } => {
                Some(ToolCallPart::new(name, ToolCallArgs::Json(input.to_string()), id).into())
            }
            ContentBlock::Thinking {
                thinking,
                signature,
            } => Some(
                ThinkingPart {
                    content: thinking,
                    signature: (!signature.is_empty()).then_some(signature),
                }
                .into(),
            ),
            ContentBlock::ToolResult { .. } => None,
        })
        .collect();

    let mut usage = response.usage.input_usage();
    usage += &response.usage.output_usage();
    (
        ModelResponse::new(parts, response.model, Utc::now()),
        usage.with_requests(1),
    )
}

#[async_trait]
impl Model for AnthropicModel {
    async fn request(
        &self,
        messages: &[ModelMessage],
        settings: Option<&ModelSettings>,
        parameters: &ModelRequestParameters,
    ) -> Result<(ModelResponse, Usage), ModelError> {
        check_allow_model_requests()?;
        let body = self.build_request(messages, settings, parameters, false);
        let response = self.send(&body, settings).await?;
        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            ModelError::upstream_decode("anthropic", format!("failed to parse response: {e}"))
        })?;
        Ok(process_response(parsed))
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

        let frames = sse_frames(response);
        let head = vec![DecodedEvent::Usage(Usage::new().with_requests(1))];
        let stream = futures::stream::once(async move { Ok(head) })
            .chain(decode_stream(frames, AnthropicStreamDecoder));
        Ok(StreamedResponse::new(
            self.model_name.clone(),
            Utc::now(),
            Box::pin(stream),
        ))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn system(&self) -> &str {
        "anthropic"
    }

    fn variant_name(&self) -> &'static str {
        "AnthropicModel"
    }

    fn base_url(&self) -> Option<&str> {
        Some(&self.config.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::gate::{lock_gate, override_allow_model_requests};
    use crate::llm::sse::sse_frames_from_text;
    use crate::messages::ModelRequest;

    const RECORDED: &str = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":12,\"output_tokens\":1}}}\n\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
        "event: ping\n",
        "data: {\"type\":\"ping\"}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Let me check\"}}\n\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"weather\",\"input\":{}}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"city\\\":\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"Paris\\\"}\"}}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":20}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );

    #[tokio::test]
    async fn recorded_stream_accumulates_text_and_tool_call() {
        let mut stream = StreamedResponse::from_source(
            "claude-3-5-sonnet-latest",
            Utc::now(),
            sse_frames_from_text(RECORDED),
            AnthropicStreamDecoder,
        );
        stream.ensure_exhausted().await.unwrap();

        let response = stream.get();
        assert_eq!(response.text(), "Let me check");
        let calls: Vec<_> = response.tool_calls().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_call_id, "toolu_1");
        assert_eq!(calls[0].args_as_json_str(), "{\"city\":\"Paris\"}");

        let usage = stream.usage();
        assert_eq!(usage.request_tokens, Some(12));
        assert_eq!(usage.response_tokens, Some(20));
        assert_eq!(usage.total_tokens, Some(32));
    }

    #[test]
    fn thinking_and_signature_deltas() {
        let mut decoder = AnthropicStreamDecoder;
        let frame = |data: Value| SseFrame {
            event: None,
            data: data.to_string(),
        };

        let events = decoder
            .decode(frame(json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "signature_delta", "signature": "sig"}
            })))
            .unwrap();
        assert_eq!(
            events,
            vec![DecodedEvent::Delta(DeltaEvent::ThinkingPartDelta {
                vendor_id: 0u64.into(),
                content_delta: None,
                signature_delta: Some("sig".into()),
            })]
        );

        let events = decoder
            .decode(frame(json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "thinking_delta", "thinking": "hmm"}
            })))
            .unwrap();
        assert_eq!(events, vec![DecodedEvent::Delta(DeltaEvent::thinking(0u64, "hmm"))]);
    }

    #[test]
    fn error_event_fails_decode() {
        let mut decoder = AnthropicStreamDecoder;
        let error = decoder
            .decode(SseFrame {
                event: Some("error".into()),
                data: r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#
                    .into(),
            })
            .unwrap_err();

        assert!(error.is_upstream_decode());
        assert!(error.to_string().contains("overloaded_error"));
    }

    #[test]
    fn delta_without_index_fails_decode() {
        let mut decoder = AnthropicStreamDecoder;
        let error = decoder
            .decode(SseFrame {
                event: None,
                data: r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"x"}}"#
                    .into(),
            })
            .unwrap_err();
        assert!(error.is_upstream_decode());
    }

    #[test]
    fn messages_merge_roles_and_lift_system() {
        let history = vec![
            ModelMessage::from(ModelRequest::new(vec![
                RequestPart::system("be brief"),
                RequestPart::user("weather?"),
            ])),
            ModelMessage::from(ModelResponse::new(
                vec![
                    TextPart::new("checking").into(),
                    ToolCallPart::new("weather", ToolCallArgs::Json("{\"city\":\"Paris\"}".into()), "toolu_1")
                        .into(),
                ],
                "claude",
                Utc::now(),
            )),
            ModelMessage::from(ModelRequest::new(vec![
                RequestPart::tool_return("weather", json!("sunny"), "toolu_1"),
                RequestPart::retry("try again", None, None),
            ])),
        ];

        let (system, messages) = map_messages(&history);
        assert_eq!(system.as_deref(), Some("be brief"));
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
        assert_eq!(messages[1].content.len(), 2);
        assert_eq!(messages[2].content.len(), 2);
        assert!(matches!(
            &messages[1].content[1],
            ContentBlock::ToolUse { input, .. } if input["city"] == "Paris"
        ));
    }

    #[test]
    fn new_requires_key() {
        let error = AnthropicModel::new("claude", ProviderConfig::anthropic("")).unwrap_err();
        assert!(error.is_configuration());
    }

    #[tokio::test]
    async fn request_stream_respects_gate() {
        let _lock = lock_gate();
        let _guard = override_allow_model_requests(false);
        let model = AnthropicModel::new("claude", ProviderConfig::anthropic("k")).unwrap();

        let error = model
            .request_stream(&[], None, &ModelRequestParameters::default())
            .await
            .unwrap_err();
        assert!(error.is_requests_disabled());
    }
}
