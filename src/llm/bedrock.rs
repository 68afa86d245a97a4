//! Bedrock Converse stream decoder.
//!
//! Decodes `ConverseStream` output events, already deserialized to JSON by
//! whatever transport carries them. Content blocks are tracked under their
//! `contentBlockIndex`.

use crate::llm::error::ModelError;
use crate::llm::parts::DeltaEvent;
use crate::llm::streaming::{DecodedEvent, EventDecoder};
use crate::llm::usage::Usage;
use crate::messages::ToolArgsDelta;
use serde_json::Value;

/// Decodes Bedrock Converse stream events.
///
/// `messageStart` and `messageStop` carry nothing the response needs and
/// are skipped.
#[derive(Debug, Clone, Default)]
pub struct BedrockStreamDecoder {
    // toolUse deltas do not repeat the id, so the last started one is reused
    last_tool_id: Option<String>,
}

impl BedrockStreamDecoder {
    /// Creates a decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn index(&self, block: &Value) -> Result<u64, ModelError> {
        block
            .get("contentBlockIndex")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                ModelError::upstream_decode(self.provider(), "content block without contentBlockIndex")
            })
    }

    fn usage(&self, metadata: &Value) -> Option<Usage> {
        let usage = metadata.get("usage")?;
        let count = |key: &str| usage.get(key).and_then(Value::as_u64);
        Some(Usage {
            request_tokens: count("inputTokens"),
            response_tokens: count("outputTokens"),
            total_tokens: count("totalTokens"),
            ..Usage::default()
        })
    }
}

impl EventDecoder for BedrockStreamDecoder {
    type Chunk = Value;

    fn provider(&self) -> &'static str {
        "bedrock"
    }

    fn decode(&mut self, chunk: Value) -> Result<Vec<DecodedEvent>, ModelError> {
        let mut events = Vec::new();

        if let Some(metadata) = chunk.get("metadata") {
            events.extend(self.usage(metadata).map(DecodedEvent::Usage));
            return Ok(events);
        }

        if let Some(start) = chunk.get("contentBlockStart") {
            let index = self.index(start)?;
            if let Some(tool_use) = start.get("start").and_then(|s| s.get("toolUse")) {
                let id = tool_use.get("toolUseId").and_then(Value::as_str).map(str::to_string);
                let name = tool_use.get("name").and_then(Value::as_str).map(str::to_string);
                self.last_tool_id.clone_from(&id);
                events.push(DeltaEvent::tool_call(index, name, None, id).into());
            }
        }

        if let Some(block) = chunk.get("contentBlockDelta") {
            let index = self.index(block)?;
            let delta = block.get("delta").ok_or_else(|| {
                ModelError::upstream_decode(self.provider(), "contentBlockDelta without delta")
            })?;
            if let Some(text) = delta.get("text").and_then(Value::as_str) {
                events.push(DeltaEvent::text(index, text).into());
            }
            if let Some(tool_use) = delta.get("toolUse") {
                let name = tool_use.get("name").and_then(Value::as_str).map(str::to_string);
                let input = tool_use
                    .get("input")
                    .and_then(Value::as_str)
                    .map(|s| ToolArgsDelta::Fragment(s.to_string()));
                events.push(
                    DeltaEvent::tool_call(index, name, input, self.last_tool_id.clone()).into(),
                );
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::streaming::StreamedResponse;
    use chrono::Utc;
    use serde_json::json;

    fn recorded() -> Vec<Value> {
        vec![
            json!({"messageStart": {"role": "assistant"}}),
            json!({"contentBlockDelta": {"contentBlockIndex": 0, "delta": {"text": "Looking "}}}),
            json!({"contentBlockDelta": {"contentBlockIndex": 0, "delta": {"text": "it up"}}}),
            json!({"contentBlockStart": {"contentBlockIndex": 1, "start": {"toolUse": {"toolUseId": "tooluse_1", "name": "lookup"}}}}),
            json!({"contentBlockDelta": {"contentBlockIndex": 1, "delta": {"toolUse": {"input": "{\"id\":"}}}}),
            json!({"contentBlockDelta": {"contentBlockIndex": 1, "delta": {"toolUse": {"input": "7}"}}}}),
            json!({"messageStop": {"stopReason": "tool_use"}}),
            json!({"metadata": {"usage": {"inputTokens": 9, "outputTokens": 5, "totalTokens": 14}}}),
        ]
    }

    #[tokio::test]
    async fn recorded_converse_stream() {
        let source = futures::stream::iter(recorded().into_iter().map(Ok::<_, ModelError>));
        let mut stream = StreamedResponse::from_source(
            "anthropic.claude-3-5-sonnet",
            Utc::now(),
            Box::pin(source),
            BedrockStreamDecoder::new(),
        );
        stream.ensure_exhausted().await.unwrap();

        let response = stream.get();
        assert_eq!(response.text(), "Looking it up");
        let call = response.tool_calls().next().unwrap();
        assert_eq!(call.tool_name, "lookup");
        assert_eq!(call.tool_call_id, "tooluse_1");
        assert_eq!(call.args_as_json_str(), "{\"id\":7}");

        let usage = stream.usage();
        assert_eq!(usage.request_tokens, Some(9));
        assert_eq!(usage.total_tokens, Some(14));
    }

    #[test]
    fn delta_without_index_is_decode_error() {
        let mut decoder = BedrockStreamDecoder::new();
        let error = decoder
            .decode(json!({"contentBlockDelta": {"delta": {"text": "x"}}}))
            .unwrap_err();
        assert!(error.is_upstream_decode());
    }

    #[test]
    fn metadata_without_usage_is_ignored() {
        let mut decoder = BedrockStreamDecoder::new();
        assert!(decoder.decode(json!({"metadata": {}})).unwrap().is_empty());
    }
}
