//! Streamed response handling.
//!
//! A [`StreamedResponse`] pulls decoded provider events from an upstream
//! source, merges them into a [`PartsManager`] and a [`UsageAccumulator`], and
//! exposes both the normalized event sequence and a snapshot of everything
//! accumulated so far.
//!
//! The upstream source is opened at most once. Every normalized event is
//! recorded, so iterating again replays the recorded sequence instead of
//! touching the transport. The source is dropped, releasing the transport, as
//! soon as the stream ends, fails, or the response itself is dropped.

use crate::llm::error::ModelError;
use crate::llm::parts::{ArgsMergeStrategy, DeltaEvent, PartsManager};
use crate::llm::usage::{Usage, UsageAccumulator};
use crate::messages::{ModelResponse, ResponseStreamEvent};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One item decoded from a provider chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    /// A change to a response part
    Delta(DeltaEvent),
    /// Usage reported by the provider
    Usage(Usage),
}

impl From<DeltaEvent> for DecodedEvent {
    fn from(delta: DeltaEvent) -> Self {
        Self::Delta(delta)
    }
}

impl From<Usage> for DecodedEvent {
    fn from(usage: Usage) -> Self {
        Self::Usage(usage)
    }
}

/// Type alias for a boxed stream of provider-native chunks.
pub type RawEventStream<C> = Pin<Box<dyn Stream<Item = Result<C, ModelError>> + Send>>;

/// Type alias for a boxed stream of decoded event batches.
pub type DecodedEventStream =
    Pin<Box<dyn Stream<Item = Result<Vec<DecodedEvent>, ModelError>> + Send>>;

/// Turns provider-native chunks into decoded events.
///
/// One decoder exists per provider wire format. A decoder may keep state
/// between chunks, e.g. to remember which block a later delta belongs to.
pub trait EventDecoder: Send + 'static {
    /// The provider-native chunk type
    type Chunk: Send + 'static;

    /// Returns the provider name used in error messages.
    fn provider(&self) -> &'static str;

    /// Decodes one chunk into zero or more events.
    ///
    /// # Errors
    ///
    /// Returns an upstream decode error if the chunk is malformed.
    fn decode(&mut self, chunk: Self::Chunk) -> Result<Vec<DecodedEvent>, ModelError>;

    /// Returns how this format streams tool call arguments.
    fn args_strategy(&self) -> ArgsMergeStrategy {
        ArgsMergeStrategy::JsonFragments
    }

    /// Called once after the last chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream ended in a state the protocol forbids.
    fn finish(&mut self) -> Result<Vec<DecodedEvent>, ModelError> {
        Ok(Vec::new())
    }
}

/// Fuses a raw chunk stream with its decoder.
///
/// The first error, whether from the transport or the decoder, ends the
/// stream.
pub fn decode_stream<D: EventDecoder>(
    mut source: RawEventStream<D::Chunk>,
    mut decoder: D,
) -> DecodedEventStream {
    Box::pin(async_stream::stream! {
        while let Some(chunk) = source.next().await {
            match chunk.and_then(|c| decoder.decode(c)) {
                Ok(events) => yield Ok(events),
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        match decoder.finish() {
            Ok(events) if events.is_empty() => {}
            Ok(events) => yield Ok(events),
            Err(e) => yield Err(e),
        }
    })
}

/// Lifecycle of a [`StreamedResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Constructed; the source has not been opened
    Idle,
    /// The source is open and events are being applied
    Streaming,
    /// The source ended; usage and parts are final
    Exhausted,
    /// The source or an event failed; accumulated state is kept
    Failed,
}

impl StreamState {
    /// Returns true for `Exhausted` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exhausted | Self::Failed)
    }
}

#[derive(Debug)]
struct Accumulated {
    parts: PartsManager,
    usage: UsageAccumulator,
    state: StreamState,
    error: Option<ModelError>,
}

fn read(lock: &RwLock<Accumulated>) -> RwLockReadGuard<'_, Accumulated> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(lock: &RwLock<Accumulated>) -> RwLockWriteGuard<'_, Accumulated> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// A read-only view of a streamed response for other tasks.
///
/// Snapshots taken through the handle reflect a prefix of the events applied
/// by the task driving the response.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    shared: Arc<RwLock<Accumulated>>,
    model_name: String,
    timestamp: DateTime<Utc>,
}

impl SnapshotHandle {
    /// Returns the response accumulated so far.
    #[must_use]
    pub fn get(&self) -> ModelResponse {
        ModelResponse::new(
            read(&self.shared).parts.get_parts(),
            self.model_name.clone(),
            self.timestamp,
        )
    }

    /// Returns the usage accumulated so far.
    #[must_use]
    pub fn usage(&self) -> Usage {
        read(&self.shared).usage.totals().clone()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        read(&self.shared).state
    }
}

type SourceFactory = Box<dyn FnOnce() -> DecodedEventStream + Send>;

enum Source {
    Pending(SourceFactory),
    Open(DecodedEventStream),
    Released,
}

type FinishHook = Box<dyn FnOnce(&ModelResponse, &Usage) + Send>;

/// A model response that is still arriving.
///
/// Drive it with [`next_event`](Self::next_event) or [`events`](Self::events);
/// read the current state at any time with [`get`](Self::get) and
/// [`usage`](Self::usage). One task drives the response; others may read
/// through a [`SnapshotHandle`].
pub struct StreamedResponse {
    model_name: String,
    timestamp: DateTime<Utc>,
    shared: Arc<RwLock<Accumulated>>,
    source: Mutex<Source>,
    log: Vec<ResponseStreamEvent>,
    cursor: usize,
    error_reported: bool,
    finish_hooks: Vec<FinishHook>,
    finished: bool,
}

impl StreamedResponse {
    /// Creates a response over an already decoded event stream.
    #[must_use]
    pub fn new(
        model_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        stream: DecodedEventStream,
    ) -> Self {
        Self::lazy(model_name, timestamp, move || stream)
    }

    /// Creates a response whose source is built on first use.
    ///
    /// `open` runs at most once: on the first pull or the first snapshot.
    #[must_use]
    pub fn lazy<F>(model_name: impl Into<String>, timestamp: DateTime<Utc>, open: F) -> Self
    where
        F: FnOnce() -> DecodedEventStream + Send + 'static,
    {
        Self::lazy_with_args_strategy(model_name, timestamp, ArgsMergeStrategy::default(), open)
    }

    /// Creates a lazily opened response that merges tool call arguments
    /// with `strategy`.
    #[must_use]
    pub fn lazy_with_args_strategy<F>(
        model_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        strategy: ArgsMergeStrategy,
        open: F,
    ) -> Self
    where
        F: FnOnce() -> DecodedEventStream + Send + 'static,
    {
        Self {
            model_name: model_name.into(),
            timestamp,
            shared: Arc::new(RwLock::new(Accumulated {
                parts: PartsManager::new(strategy),
                usage: UsageAccumulator::new(),
                state: StreamState::Idle,
                error: None,
            })),
            source: Mutex::new(Source::Pending(Box::new(open))),
            log: Vec::new(),
            cursor: 0,
            error_reported: false,
            finish_hooks: Vec::new(),
            finished: false,
        }
    }

    /// Creates a response over raw provider chunks and their decoder.
    ///
    /// Tool call arguments are merged the way the decoder's format streams them.
    #[must_use]
    pub fn from_source<D: EventDecoder>(
        model_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        source: RawEventStream<D::Chunk>,
        decoder: D,
    ) -> Self {
        let strategy = decoder.args_strategy();
        Self::lazy_with_args_strategy(model_name, timestamp, strategy, move || {
            decode_stream(source, decoder)
        })
    }

    /// Returns the model name fixed at stream start.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Returns the timestamp fixed at stream start.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        read(&self.shared).state
    }

    /// Returns true once the source has ended successfully.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.state() == StreamState::Exhausted
    }

    /// Returns the error that ended the stream, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<ModelError> {
        read(&self.shared).error.clone()
    }

    /// Returns the response accumulated so far.
    ///
    /// Opens the source if it has not been opened yet, but never waits for
    /// or applies events.
    #[must_use]
    pub fn get(&self) -> ModelResponse {
        self.initiate();
        ModelResponse::new(
            read(&self.shared).parts.get_parts(),
            self.model_name.clone(),
            self.timestamp,
        )
    }

    /// Returns the usage accumulated so far. Final once exhausted.
    #[must_use]
    pub fn usage(&self) -> Usage {
        read(&self.shared).usage.totals().clone()
    }

    /// Returns a handle other tasks can take snapshots through.
    #[must_use]
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        SnapshotHandle {
            shared: Arc::clone(&self.shared),
            model_name: self.model_name.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Returns the normalized events recorded so far.
    #[must_use]
    pub fn replay(&self) -> &[ResponseStreamEvent] {
        &self.log
    }

    /// Registers a callback that receives the final response and usage.
    ///
    /// Callbacks run exactly once: when the stream is exhausted, when it
    /// fails, or when an opened response is dropped before either. A
    /// response dropped before its source was opened never runs them. A
    /// callback registered after the stream finished runs immediately.
    pub fn on_finish<F>(&mut self, hook: F)
    where
        F: FnOnce(&ModelResponse, &Usage) + Send + 'static,
    {
        if self.finished {
            hook(&self.get(), &self.usage());
        } else {
            self.finish_hooks.push(Box::new(hook));
        }
    }

    /// Returns the next normalized event.
    ///
    /// Returns `None` once the stream is exhausted. If the stream fails, the
    /// error is returned once and `None` after that.
    pub async fn next_event(&mut self) -> Option<Result<ResponseStreamEvent, ModelError>> {
        let item = self.event_at(self.cursor).await;
        match item {
            Some(Ok(_)) => self.cursor += 1,
            Some(Err(_)) if self.error_reported => return None,
            Some(Err(_)) => self.error_reported = true,
            None => {}
        }
        item
    }

    /// Returns the normalized events from the beginning as a stream.
    ///
    /// Recorded events are replayed first; the stream then continues pulling
    /// from the source. A failed stream ends every iteration with its error,
    /// independent of [`next_event`](Self::next_event).
    pub fn events(&mut self) -> impl Stream<Item = Result<ResponseStreamEvent, ModelError>> + '_ {
        async_stream::stream! {
            let mut position = 0;
            while let Some(item) = self.event_at(position).await {
                let failed = item.is_err();
                yield item;
                if failed {
                    break;
                }
                position += 1;
            }
        }
    }

    /// Drains the source.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the stream, if it failed.
    pub async fn ensure_exhausted(&mut self) -> Result<(), ModelError> {
        while !self.state().is_terminal() {
            self.pull().await;
        }
        match self.error() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn event_at(&mut self, position: usize) -> Option<Result<ResponseStreamEvent, ModelError>> {
        loop {
            if let Some(event) = self.log.get(position) {
                return Some(Ok(event.clone()));
            }
            match self.state() {
                StreamState::Exhausted => return None,
                StreamState::Failed => return self.error().map(Err),
                StreamState::Idle | StreamState::Streaming => self.pull().await,
            }
        }
    }

    fn initiate(&self) {
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*source, Source::Pending(_)) {
            if let Source::Pending(open) = std::mem::replace(&mut *source, Source::Released) {
                *source = Source::Open(open());
            }
            let mut shared = write(&self.shared);
            if shared.state == StreamState::Idle {
                shared.state = StreamState::Streaming;
            }
            tracing::debug!(model = %self.model_name, "stream opened");
        }
    }

    async fn pull(&mut self) {
        self.initiate();
        let next = match self.source.get_mut().unwrap_or_else(PoisonError::into_inner) {
            Source::Open(stream) => stream.next().await,
            Source::Pending(_) | Source::Released => None,
        };
        match next {
            Some(Ok(batch)) => self.apply_batch(batch),
            Some(Err(error)) => self.fail(error),
            None => self.exhaust(),
        }
    }

    fn apply_batch(&mut self, batch: Vec<DecodedEvent>) {
        let mut failure = None;
        {
            let mut shared = write(&self.shared);
            for decoded in batch {
                match decoded {
                    DecodedEvent::Usage(usage) => shared.usage.add(&usage),
                    DecodedEvent::Delta(delta) => match shared.parts.apply(delta) {
                        Ok(applied) => self.log.extend(applied.event),
                        Err(error) => {
                            failure = Some(ModelError::from(error));
                            break;
                        }
                    },
                }
            }
        }
        if let Some(error) = failure {
            self.fail(error);
        }
    }

    fn fail(&mut self, error: ModelError) {
        tracing::warn!(model = %self.model_name, error = %error, "stream failed");
        {
            let mut shared = write(&self.shared);
            if shared.state.is_terminal() {
                return;
            }
            shared.state = StreamState::Failed;
            shared.error = Some(error);
        }
        self.release();
        self.finish();
    }

    fn exhaust(&mut self) {
        {
            let mut shared = write(&self.shared);
            if shared.state.is_terminal() {
                return;
            }
            shared.state = StreamState::Exhausted;
            tracing::debug!(
                model = %self.model_name,
                parts = shared.parts.len(),
                events = self.log.len(),
                "stream exhausted"
            );
        }
        self.release();
        self.finish();
    }

    fn release(&mut self) {
        *self.source.get_mut().unwrap_or_else(PoisonError::into_inner) = Source::Released;
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.finish_hooks.is_empty() {
            return;
        }
        let response = ModelResponse::new(
            read(&self.shared).parts.get_parts(),
            self.model_name.clone(),
            self.timestamp,
        );
        let usage = self.usage();
        for hook in self.finish_hooks.drain(..) {
            hook(&response, &usage);
        }
    }
}

impl Drop for StreamedResponse {
    fn drop(&mut self) {
        let opened = !matches!(
            *self.source.get_mut().unwrap_or_else(PoisonError::into_inner),
            Source::Pending(_)
        );
        self.release();
        if opened {
            self.finish();
        }
    }
}

impl fmt::Debug for StreamedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamedResponse")
            .field("model_name", &self.model_name)
            .field("timestamp", &self.timestamp)
            .field("state", &self.state())
            .field("events", &self.log.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{TextPart, ToolArgsDelta};
    use futures::stream;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn scripted(batches: Vec<Result<Vec<DecodedEvent>, ModelError>>) -> DecodedEventStream {
        Box::pin(stream::iter(batches))
    }

    fn text(index: usize, delta: &str) -> DecodedEvent {
        DecodedEvent::Delta(DeltaEvent::text(index, delta))
    }

    #[tokio::test]
    async fn snapshot_before_consumption_is_empty() {
        let response = StreamedResponse::new(
            "m",
            Utc::now(),
            scripted(vec![Ok(vec![text(0, "hi")])]),
        );
        assert_eq!(response.state(), StreamState::Idle);
        assert!(response.get().is_empty());
        assert_eq!(response.state(), StreamState::Streaming);
    }

    #[tokio::test]
    async fn part_start_then_delta_builds_text() {
        let mut response = StreamedResponse::new(
            "m",
            Utc::now(),
            scripted(vec![
                Ok(vec![DecodedEvent::Delta(DeltaEvent::part_start(
                    0usize,
                    TextPart::new("Hel"),
                ))]),
                Ok(vec![text(0, "lo")]),
            ]),
        );

        response.ensure_exhausted().await.unwrap();
        assert!(response.is_exhausted());
        assert_eq!(response.get().text(), "Hello");
        assert_eq!(response.replay().len(), 2);
    }

    #[tokio::test]
    async fn source_opens_once() {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opened);
        let mut response = StreamedResponse::lazy("m", Utc::now(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            scripted(vec![Ok(vec![text(0, "a")]), Ok(vec![text(0, "b")])])
        });

        let _ = response.get();
        let first: Vec<_> = response.events().collect().await;
        let second: Vec<_> = response.events().collect().await;

        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn replay_after_failure_repeats_error() {
        let mut response = StreamedResponse::new(
            "m",
            Utc::now(),
            scripted(vec![
                Ok(vec![text(0, "partial")]),
                Err(ModelError::upstream_decode("m", "bad")),
            ]),
        );

        let first: Vec<_> = response.events().collect().await;
        let second: Vec<_> = response.events().collect().await;

        assert_eq!(first.len(), 2);
        assert!(first[0].is_ok());
        assert!(first[1].as_ref().unwrap_err().is_upstream_decode());
        assert_eq!(first, second);

        assert!(response.next_event().await.unwrap().is_ok());
        assert!(response.next_event().await.unwrap().is_err());
        assert!(response.next_event().await.is_none());
        assert_eq!(response.events().collect::<Vec<_>>().await, first);
    }

    #[tokio::test]
    async fn lazy_response_merges_mapping_args() {
        let args = |value: serde_json::Value| value.as_object().cloned().map(ToolArgsDelta::Mapping);
        let mut response = StreamedResponse::lazy_with_args_strategy(
            "m",
            Utc::now(),
            ArgsMergeStrategy::Mapping,
            move || {
                scripted(vec![
                    Ok(vec![DecodedEvent::Delta(DeltaEvent::tool_call(
                        0usize,
                        Some("f".into()),
                        args(serde_json::json!({"a": 1, "b": 2})),
                        None,
                    ))]),
                    Ok(vec![DecodedEvent::Delta(DeltaEvent::tool_call(
                        0usize,
                        None,
                        args(serde_json::json!({"b": 3})),
                        None,
                    ))]),
                ])
            },
        );

        response.ensure_exhausted().await.unwrap();

        let response = response.get();
        let call = response.tool_calls().next().unwrap();
        let merged = call.args_as_map().unwrap();
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 3);
    }

    #[tokio::test]
    async fn decoder_chooses_args_strategy() {
        struct Structured;
        impl EventDecoder for Structured {
            type Chunk = serde_json::Value;
            fn provider(&self) -> &'static str {
                "structured"
            }
            fn args_strategy(&self) -> ArgsMergeStrategy {
                ArgsMergeStrategy::Mapping
            }
            fn decode(&mut self, chunk: serde_json::Value) -> Result<Vec<DecodedEvent>, ModelError> {
                Ok(vec![DecodedEvent::Delta(DeltaEvent::tool_call(
                    0usize,
                    Some("lookup".into()),
                    chunk.as_object().cloned().map(ToolArgsDelta::Mapping),
                    None,
                ))])
            }
        }

        let chunks: RawEventStream<serde_json::Value> = Box::pin(stream::iter(vec![
            Ok(serde_json::json!({"q": "rust"})),
            Ok(serde_json::json!({"limit": 5})),
        ]));
        let mut response = StreamedResponse::from_source("m", Utc::now(), chunks, Structured);

        response.ensure_exhausted().await.unwrap();

        let response = response.get();
        let call = response.tool_calls().next().unwrap();
        let merged = call.args_as_map().unwrap();
        assert_eq!(merged["q"], "rust");
        assert_eq!(merged["limit"], 5);
    }

    #[tokio::test]
    async fn dropping_unopened_response_skips_finish_hooks() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let mut response =
            StreamedResponse::new("m", Utc::now(), scripted(vec![Ok(vec![text(0, "hi")])]));
        response.on_finish(move |_, _| flag.store(true, Ordering::SeqCst));

        drop(response);
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropping_opened_response_runs_finish_hooks() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let mut response =
            StreamedResponse::new("m", Utc::now(), scripted(vec![Ok(vec![text(0, "hi")])]));
        response.on_finish(move |_, _| flag.store(true, Ordering::SeqCst));

        let _ = response.get();
        assert_eq!(response.state(), StreamState::Streaming);

        drop(response);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn usage_only_batches_produce_no_events() {
        let mut response = StreamedResponse::new(
            "m",
            Utc::now(),
            scripted(vec![
                Ok(vec![DecodedEvent::Usage(Usage {
                    response_tokens: Some(5),
                    ..Usage::default()
                })]),
                Ok(vec![text(0, "x")]),
                Ok(vec![DecodedEvent::Usage(Usage {
                    response_tokens: Some(3),
                    request_tokens: Some(2),
                    ..Usage::default()
                })]),
            ]),
        );

        let event = response.next_event().await.unwrap().unwrap();
        assert!(event.is_part_start());
        assert!(response.next_event().await.is_none());

        let usage = response.usage();
        assert_eq!(usage.response_tokens, Some(8));
        assert_eq!(usage.request_tokens, Some(2));
    }

    #[tokio::test]
    async fn conflicting_delta_fails_stream_and_keeps_partial_state() {
        let mut response = StreamedResponse::new(
            "m",
            Utc::now(),
            scripted(vec![
                Ok(vec![text(0, "partial")]),
                Ok(vec![DecodedEvent::Delta(DeltaEvent::tool_call(
                    0usize,
                    Some("f".into()),
                    None,
                    None,
                ))]),
                Ok(vec![text(1, "never")]),
            ]),
        );

        assert!(response.next_event().await.unwrap().is_ok());
        let error = response.next_event().await.unwrap().unwrap_err();
        assert!(error.is_parts());
        assert!(response.next_event().await.is_none());

        assert_eq!(response.state(), StreamState::Failed);
        assert_eq!(response.get().text(), "partial");
        assert!(response.ensure_exhausted().await.is_err());
    }

    #[tokio::test]
    async fn finish_hook_runs_once_on_exhaustion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut response =
            StreamedResponse::new("m", Utc::now(), scripted(vec![Ok(vec![text(0, "done")])]));
        response.on_finish(move |final_response, _usage| {
            assert_eq!(final_response.text(), "done");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        response.ensure_exhausted().await.unwrap();
        response.ensure_exhausted().await.unwrap();
        drop(response);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_early_releases_source_and_finishes() {
        struct Guarded {
            released: Arc<AtomicBool>,
        }
        impl Drop for Guarded {
            fn drop(&mut self) {
                self.released.store(true, Ordering::SeqCst);
            }
        }

        let released = Arc::new(AtomicBool::new(false));
        let guard = Guarded {
            released: Arc::clone(&released),
        };
        let source: DecodedEventStream = Box::pin(async_stream::stream! {
            let _guard = guard;
            yield Ok::<_, ModelError>(vec![text(0, "one")]);
            yield Ok::<_, ModelError>(vec![text(0, "two")]);
        });

        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let mut response = StreamedResponse::new("m", Utc::now(), source);
        response.on_finish(move |_, _| flag.store(true, Ordering::SeqCst));

        assert!(response.next_event().await.is_some());
        assert!(!released.load(Ordering::SeqCst));

        drop(response);
        assert!(released.load(Ordering::SeqCst));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn snapshot_handle_reads_from_another_task() {
        let mut response =
            StreamedResponse::new("m", Utc::now(), scripted(vec![Ok(vec![text(0, "shared")])]));
        let handle = response.snapshot_handle();

        response.ensure_exhausted().await.unwrap();
        let text = tokio::spawn(async move { handle.get().text() }).await.unwrap();
        assert_eq!(text, "shared");
    }

    #[tokio::test]
    async fn decode_stream_stops_at_first_error() {
        struct Upper;
        impl EventDecoder for Upper {
            type Chunk = String;
            fn provider(&self) -> &'static str {
                "upper"
            }
            fn decode(&mut self, chunk: String) -> Result<Vec<DecodedEvent>, ModelError> {
                if chunk == "bad" {
                    return Err(ModelError::upstream_decode(self.provider(), "bad chunk"));
                }
                Ok(vec![DecodedEvent::Delta(DeltaEvent::text(0usize, chunk.to_uppercase()))])
            }
        }

        let chunks: RawEventStream<String> = Box::pin(stream::iter(vec![
            Ok("a".to_string()),
            Ok("bad".to_string()),
            Ok("c".to_string()),
        ]));
        let mut response = StreamedResponse::from_source("m", Utc::now(), chunks, Upper);

        let error = response.ensure_exhausted().await.unwrap_err();
        assert!(error.is_upstream_decode());
        assert_eq!(response.get().text(), "A");
    }
}
