//! Response parts and the deltas that grow them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The variant tag of a [`Part`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartKind {
    /// Plain text
    Text,
    /// A tool invocation
    ToolCall,
    /// Model reasoning
    Thinking,
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::ToolCall => write!(f, "tool-call"),
            Self::Thinking => write!(f, "thinking"),
        }
    }
}

/// A run of text produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPart {
    /// The text content
    pub content: String,
}

impl TextPart {
    /// Creates a text part.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Reasoning content emitted by models that expose their thinking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingPart {
    /// The thinking text
    pub content: String,
    /// Provider signature that authenticates the thinking block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ThinkingPart {
    /// Creates a thinking part without a signature.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            signature: None,
        }
    }
}

/// Arguments of a tool call.
///
/// Providers either stream arguments as JSON text fragments (OpenAI,
/// Anthropic) or deliver a structured mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolCallArgs {
    /// JSON text, possibly incomplete while streaming
    Json(String),
    /// Structured key/value arguments
    Map(Map<String, Value>),
}

impl Default for ToolCallArgs {
    fn default() -> Self {
        Self::Json(String::new())
    }
}

impl ToolCallArgs {
    /// Returns the arguments as JSON text. Empty JSON text renders as `{}`.
    #[must_use]
    pub fn as_json_str(&self) -> String {
        match self {
            Self::Json(s) if s.is_empty() => "{}".to_string(),
            Self::Json(s) => s.clone(),
            Self::Map(m) => Value::Object(m.clone()).to_string(),
        }
    }

    /// Parses the arguments into a mapping.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if JSON text does not parse as an object.
    pub fn as_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match self {
            Self::Json(s) if s.is_empty() => Ok(Map::new()),
            Self::Json(s) => serde_json::from_str(s),
            Self::Map(m) => Ok(m.clone()),
        }
    }

    /// Returns the arguments as a JSON value, falling back to the raw text
    /// as a string value when it does not parse.
    #[must_use]
    pub fn as_value(&self) -> Value {
        match self {
            Self::Json(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
            Self::Map(m) => Value::Object(m.clone()),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPart {
    /// Name of the tool to call
    pub tool_name: String,
    /// Arguments for the call
    pub args: ToolCallArgs,
    /// Identity of this call, used to match tool results
    pub tool_call_id: String,
}

impl ToolCallPart {
    /// Creates a tool call part.
    #[must_use]
    pub fn new(
        tool_name: impl Into<String>,
        args: ToolCallArgs,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            tool_call_id: tool_call_id.into(),
        }
    }

    /// Returns the arguments as JSON text.
    #[must_use]
    pub fn args_as_json_str(&self) -> String {
        self.args.as_json_str()
    }

    /// Parses the arguments into a mapping.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the accumulated arguments are not a JSON object.
    pub fn args_as_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        self.args.as_map()
    }
}

/// One semantic unit of a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part_kind", rename_all = "kebab-case")]
pub enum Part {
    /// A text run
    Text(TextPart),
    /// A tool invocation
    ToolCall(ToolCallPart),
    /// Model reasoning
    Thinking(ThinkingPart),
}

impl Part {
    /// Returns the variant tag.
    #[must_use]
    pub fn kind(&self) -> PartKind {
        match self {
            Self::Text(_) => PartKind::Text,
            Self::ToolCall(_) => PartKind::ToolCall,
            Self::Thinking(_) => PartKind::Thinking,
        }
    }

    /// Returns the text content if this is a text part.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(p) => Some(&p.content),
            _ => None,
        }
    }

    /// Returns the tool call if this is a tool call part.
    #[must_use]
    pub fn as_tool_call(&self) -> Option<&ToolCallPart> {
        match self {
            Self::ToolCall(p) => Some(p),
            _ => None,
        }
    }
}

impl From<TextPart> for Part {
    fn from(part: TextPart) -> Self {
        Self::Text(part)
    }
}

impl From<ToolCallPart> for Part {
    fn from(part: ToolCallPart) -> Self {
        Self::ToolCall(part)
    }
}

impl From<ThinkingPart> for Part {
    fn from(part: ThinkingPart) -> Self {
        Self::Thinking(part)
    }
}

/// An incremental argument update for a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArgsDelta {
    /// A fragment of JSON text to append
    Fragment(String),
    /// Keys to overwrite in a structured mapping
    Mapping(Map<String, Value>),
}

/// The change applied to an existing part, as reported to stream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part_delta_kind", rename_all = "kebab-case")]
pub enum PartDelta {
    /// Text appended to a text part
    Text {
        /// The appended text
        content_delta: String,
    },
    /// Content appended to, or signature set on, a thinking part
    Thinking {
        /// The appended thinking text
        content_delta: Option<String>,
        /// The new signature
        signature_delta: Option<String>,
    },
    /// An update to a tool call
    ToolCall {
        /// Name supplied by this delta
        tool_name_delta: Option<String>,
        /// Arguments supplied by this delta
        args_delta: Option<ToolArgsDelta>,
        /// Identity supplied by this delta
        tool_call_id: Option<String>,
    },
}
