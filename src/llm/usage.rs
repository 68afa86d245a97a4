//! Token usage counters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

/// Token and request usage for one exchange, or a running total.
///
/// Counters are optional: a provider that does not report a counter leaves
/// it `None`, and adding a usage that lacks a counter leaves the total's
/// counter unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of requests made
    #[serde(default)]
    pub requests: u64,
    /// Tokens in the request (input/prompt tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_tokens: Option<u64>,
    /// Tokens in the response (output/completion tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_tokens: Option<u64>,
    /// Total tokens as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    /// Provider-specific counters, e.g. `reasoning_tokens`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, u64>,
}

impl Usage {
    /// Creates an empty usage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a usage from request and response token counts.
    ///
    /// The total is the sum of the two.
    #[must_use]
    pub fn from_tokens(request_tokens: u64, response_tokens: u64) -> Self {
        Self {
            requests: 0,
            request_tokens: Some(request_tokens),
            response_tokens: Some(response_tokens),
            total_tokens: Some(request_tokens + response_tokens),
            details: BTreeMap::new(),
        }
    }

    /// Sets the request count.
    #[must_use]
    pub fn with_requests(mut self, requests: u64) -> Self {
        self.requests = requests;
        self
    }

    /// Adds a provider-specific counter.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: u64) -> Self {
        *self.details.entry(key.into()).or_insert(0) += value;
        self
    }

    /// Returns true if no counter has been reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests == 0
            && self.request_tokens.is_none()
            && self.response_tokens.is_none()
            && self.total_tokens.is_none()
            && self.details.is_empty()
    }

    /// Returns GenAI telemetry attributes for this usage.
    ///
    /// Zero and absent counters are omitted.
    #[must_use]
    pub fn opentelemetry_attributes(&self) -> BTreeMap<String, u64> {
        let mut attributes = BTreeMap::new();
        if let Some(tokens) = self.request_tokens.filter(|t| *t > 0) {
            attributes.insert("gen_ai.usage.input_tokens".to_string(), tokens);
        }
        if let Some(tokens) = self.response_tokens.filter(|t| *t > 0) {
            attributes.insert("gen_ai.usage.output_tokens".to_string(), tokens);
        }
        for (key, value) in self.details.iter().filter(|(_, v)| **v > 0) {
            attributes.insert(format!("gen_ai.usage.details.{key}"), *value);
        }
        attributes
    }
}

fn add_counter(total: Option<u64>, delta: Option<u64>) -> Option<u64> {
    match (total, delta) {
        (Some(a), Some(b)) => Some(a + b),
        (a, b) => a.or(b),
    }
}

impl AddAssign<&Usage> for Usage {
    fn add_assign(&mut self, delta: &Usage) {
        self.requests += delta.requests;
        self.request_tokens = add_counter(self.request_tokens, delta.request_tokens);
        self.response_tokens = add_counter(self.response_tokens, delta.response_tokens);
        self.total_tokens = add_counter(self.total_tokens, delta.total_tokens);
        for (key, value) in &delta.details {
            *self.details.entry(key.clone()).or_insert(0) += value;
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, delta: Usage) {
        *self += &delta;
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(mut self, delta: Usage) -> Usage {
        self += &delta;
        self
    }
}

/// Running usage totals for one streamed response.
///
/// No check is made that provider-reported totals match the sum of deltas.
#[derive(Debug, Clone, Default)]
pub struct UsageAccumulator {
    totals: Usage,
}

impl UsageAccumulator {
    /// Creates an accumulator with all counters unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every counter present in `delta` to the running totals.
    pub fn add(&mut self, delta: &Usage) {
        self.totals += delta;
    }

    /// Adds provider-specific counters by name.
    pub fn merge_extra<I, K>(&mut self, extra: I)
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        for (key, value) in extra {
            *self.totals.details.entry(key.into()).or_insert(0) += value;
        }
    }

    /// Returns the running totals.
    #[must_use]
    pub fn totals(&self) -> &Usage {
        &self.totals
    }

    /// Consumes the accumulator, returning the totals.
    #[must_use]
    pub fn into_totals(self) -> Usage {
        self.totals
    }
}
