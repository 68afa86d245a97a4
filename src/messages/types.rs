//! Requests, responses, and stream events.

use crate::messages::parts::{Part, PartDelta, ToolCallPart};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Responses
// =============================================================================

/// A model response: an ordered sequence of parts.
///
/// Snapshots taken while a response streams are also `ModelResponse`s; each
/// one is an independent value describing the state at the time it was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The parts, in first-seen order
    pub parts: Vec<Part>,
    /// Name of the model that produced the response
    pub model_name: String,
    /// When the response was started
    pub timestamp: DateTime<Utc>,
}

impl ModelResponse {
    /// Creates a response from parts.
    #[must_use]
    pub fn new(parts: Vec<Part>, model_name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            parts,
            model_name: model_name.into(),
            timestamp,
        }
    }

    /// Returns the concatenated content of all text parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }

    /// Returns the tool call parts in order.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallPart> {
        self.parts.iter().filter_map(Part::as_tool_call)
    }

    /// Returns true if the response has no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

// =============================================================================
// Requests
// =============================================================================

/// One part of a request sent to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part_kind", rename_all = "kebab-case")]
pub enum RequestPart {
    /// System instructions
    SystemPrompt {
        /// The instructions
        content: String,
    },
    /// A user message
    UserPrompt {
        /// The message text
        content: String,
        /// When the prompt was created
        timestamp: DateTime<Utc>,
    },
    /// The result of a tool call
    ToolReturn {
        /// Name of the tool that ran
        tool_name: String,
        /// The tool's output
        content: Value,
        /// The call this result answers
        tool_call_id: String,
    },
    /// A request for the model to try again
    RetryPrompt {
        /// What went wrong
        content: String,
        /// The tool whose call failed, if any
        tool_name: Option<String>,
        /// The call that failed, if any
        tool_call_id: Option<String>,
    },
}

impl RequestPart {
    /// Creates a system prompt part.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::SystemPrompt {
            content: content.into(),
        }
    }

    /// Creates a user prompt part stamped with the current time.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::UserPrompt {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a tool return part.
    #[must_use]
    pub fn tool_return(
        tool_name: impl Into<String>,
        content: Value,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self::ToolReturn {
            tool_name: tool_name.into(),
            content,
            tool_call_id: tool_call_id.into(),
        }
    }

    /// Creates a retry prompt part.
    #[must_use]
    pub fn retry(
        content: impl Into<String>,
        tool_name: Option<String>,
        tool_call_id: Option<String>,
    ) -> Self {
        Self::RetryPrompt {
            content: content.into(),
            tool_name,
            tool_call_id,
        }
    }

    /// Returns the text a model should see for this part.
    #[must_use]
    pub fn model_text(&self) -> String {
        match self {
            Self::SystemPrompt { content } | Self::UserPrompt { content, .. } => content.clone(),
            Self::ToolReturn { content, .. } => match content {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            Self::RetryPrompt { content, .. } => {
                format!("{content}\n\nFix the errors and try again.")
            }
        }
    }
}

/// A request made of one or more parts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The request parts
    pub parts: Vec<RequestPart>,
}

impl ModelRequest {
    /// Creates a request from parts.
    #[must_use]
    pub fn new(parts: Vec<RequestPart>) -> Self {
        Self { parts }
    }

    /// Creates a request holding a single user prompt.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(vec![RequestPart::user(content)])
    }
}

/// A message in the history sent to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ModelMessage {
    /// Sent to the model
    Request(ModelRequest),
    /// Received from the model
    Response(ModelResponse),
}

impl From<ModelRequest> for ModelMessage {
    fn from(request: ModelRequest) -> Self {
        Self::Request(request)
    }
}

impl From<ModelResponse> for ModelMessage {
    fn from(response: ModelResponse) -> Self {
        Self::Response(response)
    }
}

// =============================================================================
// Stream events
// =============================================================================

/// A normalized event produced while a response streams.
///
/// `index` is the position of the part's slot in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_kind", rename_all = "kebab-case")]
pub enum ResponseStreamEvent {
    /// A part was created, or reset by a provider start event
    PartStart {
        /// Slot position
        index: usize,
        /// The part as it stands after the event
        part: Part,
    },
    /// An existing part grew
    PartDelta {
        /// Slot position
        index: usize,
        /// The change that was applied
        delta: PartDelta,
    },
}

impl ResponseStreamEvent {
    /// Returns the slot position the event refers to.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::PartStart { index, .. } | Self::PartDelta { index, .. } => *index,
        }
    }

    /// Returns true for part start events.
    #[must_use]
    pub fn is_part_start(&self) -> bool {
        matches!(self, Self::PartStart { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::parts::{TextPart, ThinkingPart, ToolCallArgs};
    use serde_json::json;

    fn response(parts: Vec<Part>) -> ModelResponse {
        ModelResponse::new(parts, "test-model", Utc::now())
    }

    #[test]
    fn text_concatenates_text_parts_only() {
        let r = response(vec![
            TextPart::new("Hello ").into(),
            ThinkingPart::new("ignored").into(),
            TextPart::new("world").into(),
        ]);
        assert_eq!(r.text(), "Hello world");
    }

    #[test]
    fn tool_calls_filters_parts() {
        let r = response(vec![
            TextPart::new("calling").into(),
            ToolCallPart::new("search", ToolCallArgs::default(), "call_1").into(),
        ]);
        let calls: Vec<_> = r.tool_calls().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "search");
    }

    #[test]
    fn retry_prompt_model_text_asks_to_fix() {
        let part = RequestPart::retry("bad args", None, None);
        assert!(part.model_text().starts_with("bad args"));
        assert!(part.model_text().contains("Fix the errors"));
    }

    #[test]
    fn tool_return_model_text_serializes_non_strings() {
        let part = RequestPart::tool_return("calc", json!({"answer": 4}), "call_1");
        assert_eq!(part.model_text(), r#"{"answer":4}"#);

        let part = RequestPart::tool_return("calc", json!("four"), "call_1");
        assert_eq!(part.model_text(), "four");
    }

    #[test]
    fn stream_event_index_and_kind() {
        let start = ResponseStreamEvent::PartStart {
            index: 2,
            part: TextPart::new("a").into(),
        };
        assert_eq!(start.index(), 2);
        assert!(start.is_part_start());

        let delta = ResponseStreamEvent::PartDelta {
            index: 0,
            delta: PartDelta::Text {
                content_delta: "b".to_string(),
            },
        };
        assert!(!delta.is_part_start());
    }
}
