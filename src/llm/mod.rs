//! Model providers and streamed response accumulation.
//!
//! This module contains the [`Model`] trait and its provider implementations,
//! the [`PartsManager`] that folds provider deltas into response parts, and
//! [`StreamedResponse`], which drives a provider stream while exposing
//! snapshots of the response accumulated so far.

mod anthropic;
mod bedrock;
mod client;
mod config;
mod error;
mod gate;
mod instrumented;
mod openai;
mod parts;
mod registry;
mod sse;
mod streaming;
mod test_model;
mod usage;

pub use anthropic::{AnthropicModel, AnthropicStreamDecoder};
pub use bedrock::BedrockStreamDecoder;
pub use client::{collect_stream, Model, ModelRequestParameters, ModelSettings, ToolDefinition};
pub use config::{
    ProviderConfig, ANTHROPIC_BASE_URL, API_KEY_NOT_SET, DEEPSEEK_BASE_URL, OLLAMA_BASE_URL,
    OPENAI_BASE_URL,
};
pub use error::{ModelError, ModelErrorKind};
pub use gate::{
    check_allow_model_requests, model_requests_allowed, override_allow_model_requests,
    set_allow_model_requests, AllowRequestsGuard,
};
pub use instrumented::{
    events_attribute, exchange_events, otel_system, request_attributes, EventMode,
    InstrumentedModel,
};
pub use openai::{open_stream as open_openai_stream, OpenAIModel, OpenAIStreamDecoder, SystemPromptRole};
pub use parts::{Applied, ArgsMergeStrategy, DeltaEvent, PartsManager};
pub use registry::{
    infer_model, infer_model_with, KnownModel, KnownProvider, ModelKind, COHERE_BASE_URL,
    GEMINI_BASE_URL, GROQ_BASE_URL, MISTRAL_BASE_URL,
};
pub use sse::{sse_frames, sse_frames_from_text, SseFrame, SseFramer};
pub use streaming::{
    decode_stream, DecodedEvent, DecodedEventStream, EventDecoder, RawEventStream,
    SnapshotHandle, StreamState, StreamedResponse,
};
pub use test_model::TestModel;
pub use usage::{Usage, UsageAccumulator};
