//! Telemetry decorator for models.
//!
//! [`InstrumentedModel`] wraps any [`Model`] and reports each exchange as a
//! `tracing` span following the OpenTelemetry GenAI conventions. It only
//! reads requests and responses, never changes them.

use crate::llm::client::{Model, ModelRequestParameters, ModelSettings};
use crate::llm::error::ModelError;
use crate::llm::streaming::StreamedResponse;
use crate::llm::usage::Usage;
use crate::messages::{messages_to_otel_events, ModelMessage, ModelResponse, TelemetryEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::field::Empty;
use tracing::{Instrument, Span};

/// Operation name reported for every request.
const OPERATION: &str = "chat";

/// How message events are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventMode {
    /// One `events` span field holding a JSON array of every event
    #[default]
    Attributes,
    /// One `tracing` event per message event
    Logs,
}

impl fmt::Display for EventMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attributes => write!(f, "attributes"),
            Self::Logs => write!(f, "logs"),
        }
    }
}

impl FromStr for EventMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "attributes" => Ok(Self::Attributes),
            "logs" => Ok(Self::Logs),
            other => Err(ModelError::configuration(
                "event_mode",
                format!("expected 'attributes' or 'logs', got '{other}'"),
            )),
        }
    }
}

/// Returns the `gen_ai.system` value for a model.
///
/// Falls back to the model's type name without its `Model` suffix when the
/// model reports no system, then maps provider names onto the semantic
/// convention names.
#[must_use]
pub fn otel_system(model: &dyn Model) -> String {
    let system = if model.system().is_empty() {
        let name = model.variant_name();
        name.strip_suffix("Model").unwrap_or(name).to_lowercase()
    } else {
        model.system().to_string()
    };
    match system.as_str() {
        "google-gla" => "gemini".to_string(),
        "google-vertex" => "vertex_ai".to_string(),
        "mistral" => "mistral_ai".to_string(),
        _ => system,
    }
}

/// Returns the request attributes recorded when the span opens.
#[must_use]
pub fn request_attributes(
    model: &dyn Model,
    settings: Option<&ModelSettings>,
) -> Vec<(String, Value)> {
    let mut attributes = vec![
        ("gen_ai.operation.name".to_string(), json!(OPERATION)),
        ("gen_ai.system".to_string(), json!(otel_system(model))),
        ("gen_ai.request.model".to_string(), json!(model.model_name())),
    ];
    if let Some(settings) = settings {
        attributes.extend(
            settings
                .numeric_attributes()
                .into_iter()
                .map(|(key, value)| (format!("gen_ai.request.{key}"), value)),
        );
    }
    attributes
}

/// Renders the request messages and the response as telemetry events.
///
/// Each response event becomes a `gen_ai.choice` event whose body holds
/// `index` 0 and the assistant message.
#[must_use]
pub fn exchange_events(messages: &[ModelMessage], response: &ModelResponse) -> Vec<TelemetryEvent> {
    let mut events = messages_to_otel_events(messages);
    for event in response.otel_events() {
        events.push(TelemetryEvent::new(
            "gen_ai.choice",
            json!({"index": 0, "message": Value::Object(event.body)}),
        ));
    }
    events
}

/// Serializes events into the JSON array recorded in attributes mode.
#[must_use]
pub fn events_attribute(events: &[TelemetryEvent], system: &str) -> String {
    let mut extra = Map::new();
    extra.insert("gen_ai.system".to_string(), json!(system));
    Value::Array(events.iter().map(|e| e.to_flat_json(&extra)).collect()).to_string()
}

fn record_number(span: &Span, field: &str, value: &Value) {
    if let Some(v) = value.as_u64() {
        span.record(field, v);
    } else if let Some(v) = value.as_i64() {
        span.record(field, v);
    } else if let Some(v) = value.as_f64() {
        span.record(field, v);
    }
}

/// Everything the finish step needs, owned so it can outlive the request.
#[derive(Debug, Clone)]
struct Exchange {
    span: Span,
    system: String,
    model_name: String,
    messages: Vec<ModelMessage>,
    event_mode: EventMode,
}

impl Exchange {
    fn finish(&self, response: &ModelResponse, usage: &Usage) {
        if self.span.is_disabled() {
            return;
        }
        let response_model = if response.model_name.is_empty() {
            &self.model_name
        } else {
            &response.model_name
        };
        self.span.record("gen_ai.response.model", response_model.as_str());

        let usage_attributes = usage.opentelemetry_attributes();
        let mut details = Map::new();
        for (key, value) in &usage_attributes {
            match key.as_str() {
                "gen_ai.usage.input_tokens" | "gen_ai.usage.output_tokens" => {
                    self.span.record(key.as_str(), *value);
                }
                _ => {
                    details.insert(key.clone(), json!(value));
                }
            }
        }
        if !details.is_empty() {
            self.span
                .record("gen_ai.usage.details", Value::Object(details).to_string().as_str());
        }

        let events = exchange_events(&self.messages, response);
        match self.event_mode {
            EventMode::Logs => {
                for event in &events {
                    let body = Value::Object(event.body.clone());
                    tracing::info!(
                        parent: &self.span,
                        event.name = %event.name,
                        gen_ai.system = %self.system,
                        body = %body,
                        "{}",
                        event.name
                    );
                }
            }
            EventMode::Attributes => {
                self.span
                    .record("events", events_attribute(&events, &self.system).as_str());
            }
        }
    }
}

/// A model wrapper that reports every request as a telemetry span.
///
/// # Example
///
/// ```ignore
/// use partwise::llm::{infer_model, EventMode, InstrumentedModel};
///
/// let model = InstrumentedModel::new(infer_model("openai:gpt-4o")?, EventMode::Logs);
/// ```
#[derive(Debug, Clone)]
pub struct InstrumentedModel<M> {
    inner: M,
    event_mode: EventMode,
}

impl<M: Model> InstrumentedModel<M> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: M, event_mode: EventMode) -> Self {
        Self { inner, event_mode }
    }

    /// Returns the wrapped model.
    #[must_use]
    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Returns how message events are reported.
    #[must_use]
    pub fn event_mode(&self) -> EventMode {
        self.event_mode
    }

    fn open(&self, messages: &[ModelMessage], settings: Option<&ModelSettings>) -> Exchange {
        let system = otel_system(&self.inner);
        let model_name = self.inner.model_name().to_string();
        let span = tracing::info_span!(
            "chat",
            otel.name = %format!("{OPERATION} {model_name}"),
            gen_ai.operation.name = OPERATION,
            gen_ai.system = %system,
            gen_ai.request.model = %model_name,
            gen_ai.request.max_tokens = Empty,
            gen_ai.request.top_p = Empty,
            gen_ai.request.seed = Empty,
            gen_ai.request.temperature = Empty,
            gen_ai.request.presence_penalty = Empty,
            gen_ai.request.frequency_penalty = Empty,
            gen_ai.response.model = Empty,
            gen_ai.usage.input_tokens = Empty,
            gen_ai.usage.output_tokens = Empty,
            gen_ai.usage.details = Empty,
            events = Empty,
        );
        for (key, value) in request_attributes(&self.inner, settings) {
            if key.starts_with("gen_ai.request.") && key != "gen_ai.request.model" {
                record_number(&span, &key, &value);
            }
        }

        Exchange {
            span,
            system,
            model_name,
            messages: messages.to_vec(),
            event_mode: self.event_mode,
        }
    }
}

#[async_trait]
impl<M: Model> Model for InstrumentedModel<M> {
    async fn request(
        &self,
        messages: &[ModelMessage],
        settings: Option<&ModelSettings>,
        parameters: &ModelRequestParameters,
    ) -> Result<(ModelResponse, Usage), ModelError> {
        let exchange = self.open(messages, settings);
        let result = self
            .inner
            .request(messages, settings, parameters)
            .instrument(exchange.span.clone())
            .await;

        match &result {
            Ok((response, usage)) => exchange.finish(response, usage),
            Err(e) => tracing::warn!(parent: &exchange.span, error = %e, "model request failed"),
        }
        result
    }

    async fn request_stream(
        &self,
        messages: &[ModelMessage],
        settings: Option<&ModelSettings>,
        parameters: &ModelRequestParameters,
    ) -> Result<StreamedResponse, ModelError> {
        let exchange = self.open(messages, settings);
        let mut stream = self
            .inner
            .request_stream(messages, settings, parameters)
            .instrument(exchange.span.clone())
            .await
            .inspect_err(|e| {
                tracing::warn!(parent: &exchange.span, error = %e, "model stream failed to start");
            })?;

        stream.on_finish(move |response, usage| exchange.finish(response, usage));
        Ok(stream)
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn system(&self) -> &str {
        self.inner.system()
    }

    fn variant_name(&self) -> &'static str {
        self.inner.variant_name()
    }

    fn base_url(&self) -> Option<&str> {
        self.inner.base_url()
    }
}
