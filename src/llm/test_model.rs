//! In-process model for tests.
//!
//! [`TestModel`] answers without any network access and is never blocked by
//! the request gate, so code that drives a [`Model`] can be tested with
//! requests disabled.

use crate::llm::client::{Model, ModelRequestParameters, ModelSettings};
use crate::llm::error::ModelError;
use crate::llm::parts::DeltaEvent;
use crate::llm::streaming::{DecodedEvent, StreamedResponse};
use crate::llm::usage::Usage;
use crate::messages::{
    ModelMessage, ModelResponse, Part, RequestPart, TextPart, ToolCallArgs, ToolCallPart,
};
use crate::types::ToolCallId;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};

/// Request tokens charged for every request before counting words.
const BASE_REQUEST_TOKENS: u64 = 50;

/// A model that answers from its own configuration.
///
/// On the first request it calls every available function tool with empty
/// arguments. Once tool results are in the history, or when there are no
/// tools, it replies with text: the custom text if set, otherwise a JSON
/// summary of the tool results, otherwise `success (no tool calls)`.
#[derive(Debug, Clone)]
pub struct TestModel {
    custom_result_text: Option<String>,
    call_tools: bool,
}

impl Default for TestModel {
    fn default() -> Self {
        Self::new()
    }
}

impl TestModel {
    /// Creates a test model that calls tools and then replies.
    #[must_use]
    pub fn new() -> Self {
        Self {
            custom_result_text: None,
            call_tools: true,
        }
    }

    /// Sets the final reply text.
    #[must_use]
    pub fn with_result_text(mut self, text: impl Into<String>) -> Self {
        self.custom_result_text = Some(text.into());
        self
    }

    /// Sets whether the model calls function tools before replying.
    #[must_use]
    pub fn with_tool_calls(mut self, call_tools: bool) -> Self {
        self.call_tools = call_tools;
        self
    }

    fn respond(&self, messages: &[ModelMessage], parameters: &ModelRequestParameters) -> Vec<Part> {
        let returns = last_tool_returns(messages);
        if self.call_tools && returns.is_empty() && !parameters.function_tools.is_empty() {
            return parameters
                .function_tools
                .iter()
                .map(|tool| {
                    ToolCallPart::new(
                        tool.name.clone(),
                        ToolCallArgs::Map(Map::new()),
                        ToolCallId::new().to_string(),
                    )
                    .into()
                })
                .collect();
        }

        let text = match &self.custom_result_text {
            Some(text) => text.clone(),
            None if returns.is_empty() => "success (no tool calls)".to_string(),
            None => Value::Object(returns).to_string(),
        };
        vec![TextPart::new(text).into()]
    }
}

/// Tool results in the most recent request, keyed by tool name.
fn last_tool_returns(messages: &[ModelMessage]) -> Map<String, Value> {
    let mut returns = Map::new();
    let last_request = messages.iter().rev().find_map(|m| match m {
        ModelMessage::Request(request) => Some(request),
        ModelMessage::Response(_) => None,
    });
    for part in last_request.into_iter().flat_map(|r| &r.parts) {
        if let RequestPart::ToolReturn {
            tool_name, content, ..
        } = part
        {
            returns.insert(tool_name.clone(), content.clone());
        }
    }
    returns
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

fn request_usage(messages: &[ModelMessage]) -> u64 {
    let words: u64 = messages
        .iter()
        .map(|message| match message {
            ModelMessage::Request(request) => request
                .parts
                .iter()
                .map(|part| word_count(&part.model_text()))
                .sum::<u64>(),
            ModelMessage::Response(response) => response
                .parts
                .iter()
                .map(|part| match part {
                    Part::Text(text) => word_count(&text.content),
                    Part::ToolCall(call) => word_count(&call.tool_name) + word_count(&call.args_as_json_str()),
                    Part::Thinking(thinking) => word_count(&thinking.content),
                })
                .sum(),
        })
        .sum();
    BASE_REQUEST_TOKENS + words
}

fn response_usage(parts: &[Part]) -> u64 {
    parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => word_count(&text.content),
            Part::ToolCall(call) => 1 + word_count(&call.args_as_json_str()),
            Part::Thinking(thinking) => word_count(&thinking.content),
        })
        .sum()
}

fn usage_for(messages: &[ModelMessage], parts: &[Part]) -> Usage {
    Usage::from_tokens(request_usage(messages), response_usage(parts)).with_requests(1)
}

/// Splits text into word chunks that concatenate back to the input.
fn word_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut in_space = false;
    for c in text.chars() {
        if !c.is_whitespace() && in_space && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        in_space = c.is_whitespace();
        current.push(c);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl Model for TestModel {
    async fn request(
        &self,
        messages: &[ModelMessage],
        _settings: Option<&ModelSettings>,
        parameters: &ModelRequestParameters,
    ) -> Result<(ModelResponse, Usage), ModelError> {
        let parts = self.respond(messages, parameters);
        let usage = usage_for(messages, &parts);
        Ok((ModelResponse::new(parts, "test", Utc::now()), usage))
    }

    async fn request_stream(
        &self,
        messages: &[ModelMessage],
        _settings: Option<&ModelSettings>,
        parameters: &ModelRequestParameters,
    ) -> Result<StreamedResponse, ModelError> {
        let parts = self.respond(messages, parameters);
        let usage = usage_for(messages, &parts);

        let mut batches: Vec<Result<Vec<DecodedEvent>, ModelError>> = Vec::new();
        for (index, part) in parts.into_iter().enumerate() {
            match part {
                Part::Text(text) => batches.extend(
                    word_chunks(&text.content)
                        .into_iter()
                        .map(|chunk| Ok(vec![DeltaEvent::text(index, chunk).into()])),
                ),
                other => batches.push(Ok(vec![DeltaEvent::part_start(index, other).into()])),
            }
        }
        batches.push(Ok(vec![DecodedEvent::Usage(usage)]));

        Ok(StreamedResponse::new(
            "test",
            Utc::now(),
            Box::pin(futures::stream::iter(batches)),
        ))
    }

    fn model_name(&self) -> &str {
        "test"
    }

    fn system(&self) -> &str {
        "test"
    }

    fn variant_name(&self) -> &'static str {
        "TestModel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::{collect_stream, ToolDefinition};
    use crate::llm::gate::{lock_gate, override_allow_model_requests};
    use crate::messages::ModelRequest;
    use serde_json::json;

    fn prompt(text: &str) -> Vec<ModelMessage> {
        vec![ModelMessage::from(ModelRequest::user(text))]
    }

    #[test]
    fn word_chunks_concatenate_back() {
        let chunks = word_chunks("success  (no tool calls)");
        assert_eq!(chunks, vec!["success  ", "(no ", "tool ", "calls)"]);
        assert_eq!(chunks.concat(), "success  (no tool calls)");
    }

    #[tokio::test]
    async fn replies_without_tools() {
        let (response, usage) = TestModel::new()
            .request(&prompt("hello there"), None, &ModelRequestParameters::default())
            .await
            .unwrap();

        assert_eq!(response.text(), "success (no tool calls)");
        assert_eq!(usage.request_tokens, Some(52));
        assert_eq!(usage.response_tokens, Some(4));
        assert_eq!(usage.requests, 1);
    }

    #[tokio::test]
    async fn calls_tools_then_summarizes_returns() {
        let model = TestModel::new();
        let params = ModelRequestParameters {
            function_tools: vec![ToolDefinition::new("roll", "roll a die", json!({}))],
            ..ModelRequestParameters::default()
        };

        let (first, _) = model.request(&prompt("roll"), None, &params).await.unwrap();
        let call = first.tool_calls().next().unwrap().clone();
        assert_eq!(call.tool_name, "roll");

        let history = vec![
            ModelMessage::from(ModelRequest::user("roll")),
            ModelMessage::from(first),
            ModelMessage::from(ModelRequest::new(vec![RequestPart::tool_return(
                "roll",
                json!(4),
                call.tool_call_id,
            )])),
        ];
        let (second, _) = model.request(&history, None, &params).await.unwrap();
        assert_eq!(second.text(), r#"{"roll":4}"#);
    }

    #[tokio::test]
    async fn streams_words_and_is_not_gated() {
        let _lock = lock_gate();
        let _guard = override_allow_model_requests(false);

        let model = TestModel::new().with_result_text("one two three");
        let stream = model
            .request_stream(&prompt("go"), None, &ModelRequestParameters::default())
            .await
            .unwrap();
        let (response, usage) = collect_stream(stream).await.unwrap();

        assert_eq!(response.text(), "one two three");
        assert_eq!(usage.response_tokens, Some(3));
        assert_eq!(usage.request_tokens, Some(51));
    }
}
