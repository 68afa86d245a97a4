//! # Partwise: streamed LLM response accumulation
//!
//! Providers stream a response as a sequence of small vendor-specific
//! events. Partwise decodes those events, folds them into ordered response
//! parts (text, thinking and tool calls) and tracks token usage, so callers
//! can read a consistent snapshot of the response at any moment while it
//! streams.
//!
//! ## Architecture
//!
//! - **Messages**: response parts, deltas and request messages
//! - **Parts manager**: folds vendor deltas into parts keyed by vendor id
//! - **Streamed response**: drives a provider stream and exposes snapshots
//! - **Models**: OpenAI-compatible, Anthropic and in-process test models,
//!   with a registry that resolves `provider:model` names
//! - **Instrumentation**: GenAI semantic-convention spans around requests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use partwise::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ModelError> {
//!     let model = infer_model("openai:gpt-4o")?;
//!     let messages = vec![ModelMessage::from(ModelRequest::user("Hello!"))];
//!     let mut stream = model
//!         .request_stream(&messages, None, &ModelRequestParameters::default())
//!         .await?;
//!
//!     while let Some(event) = stream.next_event().await {
//!         let _ = event?;
//!         println!("so far: {}", stream.get().text());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod messages;
pub mod types;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::PartwiseConfig;
    pub use crate::error::{ConfigError, PartsError};
    pub use crate::llm::{
        collect_stream, infer_model, InstrumentedModel, KnownModel, Model, ModelError,
        ModelRequestParameters, ModelSettings, PartsManager, StreamState, StreamedResponse,
        TestModel, ToolDefinition, Usage,
    };
    pub use crate::messages::*;
    pub use crate::types::{ToolCallId, VendorPartId};
}
