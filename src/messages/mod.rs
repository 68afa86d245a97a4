//! Message types exchanged with models.
//!
//! Responses are made of [`Part`]s. While a response streams, parts grow via
//! deltas and callers observe [`ResponseStreamEvent`]s. Requests and responses
//! can be rendered as GenAI telemetry events for instrumentation.

mod parts;
mod telemetry;
mod types;

pub use parts::{
    Part, PartDelta, PartKind, TextPart, ThinkingPart, ToolArgsDelta, ToolCallArgs, ToolCallPart,
};
pub use telemetry::{messages_to_otel_events, TelemetryEvent};
pub use types::{ModelMessage, ModelRequest, ModelResponse, RequestPart, ResponseStreamEvent};
