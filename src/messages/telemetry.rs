//! GenAI semantic-convention events for messages.

use crate::messages::parts::Part;
use crate::messages::types::{ModelMessage, ModelResponse, RequestPart};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A telemetry event describing one message or message part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Event name, e.g. `gen_ai.user.message`
    pub name: String,
    /// Event body
    pub body: Map<String, Value>,
}

impl TelemetryEvent {
    /// Creates an event from a name and a JSON object body.
    ///
    /// Non-object bodies are wrapped under a `content` key.
    #[must_use]
    pub fn new(name: impl Into<String>, body: Value) -> Self {
        let body = match body {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("content".to_string(), other);
                map
            }
        };
        Self {
            name: name.into(),
            body,
        }
    }

    /// Renders the event as a flat JSON object with an `event.name` key.
    #[must_use]
    pub fn to_flat_json(&self, extra: &Map<String, Value>) -> Value {
        let mut map = Map::new();
        map.insert("event.name".to_string(), Value::String(self.name.clone()));
        for (k, v) in &self.body {
            map.insert(k.clone(), v.clone());
        }
        for (k, v) in extra {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

impl RequestPart {
    /// Returns the telemetry event for this request part.
    #[must_use]
    pub fn otel_event(&self) -> TelemetryEvent {
        match self {
            Self::SystemPrompt { content } => TelemetryEvent::new(
                "gen_ai.system.message",
                json!({"content": content, "role": "system"}),
            ),
            Self::UserPrompt { content, .. } => {
                TelemetryEvent::new("gen_ai.user.message", json!({"content": content}))
            }
            Self::ToolReturn {
                tool_name,
                content,
                tool_call_id,
            } => TelemetryEvent::new(
                "gen_ai.tool.message",
                json!({
                    "content": content,
                    "role": "tool",
                    "id": tool_call_id,
                    "name": tool_name,
                }),
            ),
            Self::RetryPrompt {
                tool_name: None, ..
            } => TelemetryEvent::new(
                "gen_ai.user.message",
                json!({"content": self.model_text()}),
            ),
            Self::RetryPrompt {
                tool_name: Some(name),
                tool_call_id,
                ..
            } => TelemetryEvent::new(
                "gen_ai.tool.message",
                json!({
                    "content": self.model_text(),
                    "role": "tool",
                    "id": tool_call_id,
                    "name": name,
                }),
            ),
        }
    }
}

impl ModelResponse {
    /// Returns the assistant telemetry events for this response.
    ///
    /// Tool calls accumulate on the current event. A text part starts a new
    /// event when the current one already has content. Thinking parts are not
    /// reported.
    #[must_use]
    pub fn otel_events(&self) -> Vec<TelemetryEvent> {
        let mut bodies: Vec<Map<String, Value>> = vec![assistant_body()];

        for part in &self.parts {
            match part {
                Part::ToolCall(call) => {
                    if let Some(body) = bodies.last_mut() {
                        let entry = body
                            .entry("tool_calls")
                            .or_insert_with(|| Value::Array(Vec::new()));
                        if let Value::Array(calls) = entry {
                            calls.push(json!({
                                "id": call.tool_call_id,
                                "type": "function",
                                "function": {
                                    "name": call.tool_name,
                                    "arguments": call.args,
                                },
                            }));
                        }
                    }
                }
                Part::Text(text) => {
                    let has_content = bodies
                        .last()
                        .and_then(|b| b.get("content"))
                        .is_some_and(|c| c.as_str().is_some_and(|s| !s.is_empty()));
                    if has_content {
                        bodies.push(assistant_body());
                    }
                    if let Some(body) = bodies.last_mut() {
                        body.insert("content".to_string(), Value::String(text.content.clone()));
                    }
                }
                Part::Thinking(_) => {}
            }
        }

        bodies
            .into_iter()
            .map(|body| TelemetryEvent {
                name: "gen_ai.assistant.message".to_string(),
                body,
            })
            .collect()
    }
}

fn assistant_body() -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("role".to_string(), Value::String("assistant".to_string()));
    body
}

/// Flattens a message history into telemetry events.
#[must_use]
pub fn messages_to_otel_events(messages: &[ModelMessage]) -> Vec<TelemetryEvent> {
    let mut events = Vec::new();
    for message in messages {
        match message {
            ModelMessage::Request(request) => {
                events.extend(request.parts.iter().map(RequestPart::otel_event));
            }
            ModelMessage::Response(response) => events.extend(response.otel_events()),
        }
    }
    events
}
