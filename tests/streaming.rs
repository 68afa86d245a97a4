//! Integration tests for streamed response accumulation.
//!
//! These tests drive [`StreamedResponse`] through its public surface:
//! - Snapshots while and after streaming
//! - Slot ordering and usage totals
//! - Transport release and failure handling

use futures::StreamExt;
use partwise::llm::{
    DecodedEvent, DecodedEventStream, DeltaEvent, ModelError, StreamState, StreamedResponse,
    Usage,
};
use partwise::messages::{Part, PartDelta, ResponseStreamEvent, TextPart, ToolArgsDelta};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn batches(items: Vec<Result<Vec<DecodedEvent>, ModelError>>) -> DecodedEventStream {
    Box::pin(futures::stream::iter(items))
}

fn response(items: Vec<Result<Vec<DecodedEvent>, ModelError>>) -> StreamedResponse {
    StreamedResponse::new("gpt-4o", chrono::Utc::now(), batches(items))
}

/// Sets its flag when the stream holding it is dropped.
struct ReleaseFlag(Arc<AtomicBool>);

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn hello_assembles_from_start_and_delta() {
    let mut stream = response(vec![
        Ok(vec![DeltaEvent::part_start(0usize, TextPart::new("Hel")).into()]),
        Ok(vec![DeltaEvent::text(0usize, "lo").into()]),
    ]);

    let first = stream.next_event().await.unwrap().unwrap();
    assert!(first.is_part_start());
    assert_eq!(stream.get().text(), "Hel");

    let second = stream.next_event().await.unwrap().unwrap();
    assert_eq!(
        second,
        ResponseStreamEvent::PartDelta {
            index: 0,
            delta: PartDelta::Text {
                content_delta: "lo".to_string()
            },
        }
    );
    assert!(stream.next_event().await.is_none());

    let snapshot = stream.get();
    assert_eq!(snapshot.parts, vec![Part::Text(TextPart::new("Hello"))]);
    assert_eq!(snapshot.model_name, "gpt-4o");
    assert!(stream.is_exhausted());
}

#[tokio::test]
async fn parts_keep_first_seen_order() {
    let mut stream = response(vec![Ok(vec![
        DeltaEvent::text(2usize, "two").into(),
        DeltaEvent::text(0usize, "zero").into(),
        DeltaEvent::text(1usize, "one").into(),
        DeltaEvent::text(0usize, "!").into(),
    ])]);

    let indices: Vec<usize> = stream
        .events()
        .map(|event| event.unwrap().index())
        .collect()
        .await;
    assert_eq!(indices, vec![0, 1, 2, 1]);

    let texts: Vec<String> = stream
        .get()
        .parts
        .into_iter()
        .map(|part| match part {
            Part::Text(text) => text.content,
            other => panic!("unexpected part {other:?}"),
        })
        .collect();
    assert_eq!(texts, vec!["two", "zero!", "one"]);
}

#[tokio::test]
async fn snapshots_only_grow() {
    let mut stream = response(vec![
        Ok(vec![DeltaEvent::text("content", "The ").into()]),
        Ok(vec![DeltaEvent::text("content", "quick ").into()]),
        Ok(vec![DeltaEvent::tool_call(
            "call",
            Some("lookup".to_string()),
            Some(ToolArgsDelta::Fragment("{\"q\":".to_string())),
            Some("call_1".to_string()),
        )
        .into()]),
        Ok(vec![DeltaEvent::tool_call(
            "call",
            None,
            Some(ToolArgsDelta::Fragment("\"fox\"}".to_string())),
            None,
        )
        .into()]),
    ]);

    let mut previous = stream.get();
    while let Some(event) = stream.next_event().await {
        event.unwrap();
        let current = stream.get();
        assert!(current.parts.len() >= previous.parts.len());
        assert!(current.text().starts_with(&previous.text()));
        previous = current;
    }

    let call = previous.tool_calls().next().unwrap().clone();
    assert_eq!(call.tool_name, "lookup");
    assert_eq!(call.tool_call_id, "call_1");
    assert_eq!(call.args_as_json_str(), r#"{"q":"fox"}"#);
}

#[tokio::test]
async fn usage_totals_sum_every_report() {
    let mut stream = response(vec![
        Ok(vec![DecodedEvent::Usage(Usage::new().with_requests(1))]),
        Ok(vec![
            DeltaEvent::text(0usize, "hi").into(),
            DecodedEvent::Usage(Usage::from_tokens(10, 0)),
        ]),
        Ok(vec![DecodedEvent::Usage(
            Usage::from_tokens(0, 5).with_detail("reasoning_tokens", 3),
        )]),
    ]);

    stream.ensure_exhausted().await.unwrap();
    let usage = stream.usage();

    assert_eq!(usage.requests, 1);
    assert_eq!(usage.request_tokens, Some(10));
    assert_eq!(usage.response_tokens, Some(5));
    assert_eq!(usage.details.get("reasoning_tokens"), Some(&3));
}

#[tokio::test]
async fn decode_failure_keeps_partial_response() {
    let mut stream = response(vec![
        Ok(vec![DeltaEvent::text(0usize, "partial").into()]),
        Err(ModelError::upstream_decode("openai", "bad chunk")),
        Ok(vec![DeltaEvent::text(0usize, " never applied").into()]),
    ]);

    assert!(stream.next_event().await.unwrap().is_ok());
    let error = stream.next_event().await.unwrap().unwrap_err();
    assert!(error.is_upstream_decode());
    assert!(stream.next_event().await.is_none());

    assert_eq!(stream.state(), StreamState::Failed);
    assert_eq!(stream.get().text(), "partial");
    assert!(stream.error().unwrap().is_upstream_decode());
}

#[tokio::test]
async fn abandoning_the_response_releases_the_transport() {
    let released = Arc::new(AtomicBool::new(false));
    let flag = ReleaseFlag(Arc::clone(&released));
    let source: DecodedEventStream = Box::pin(async_stream::stream! {
        let _flag = flag;
        yield Ok(vec![DeltaEvent::text(0usize, "first").into()]);
        futures::future::pending::<()>().await;
    });

    let mut stream = StreamedResponse::new("gpt-4o", chrono::Utc::now(), source);
    stream.next_event().await.unwrap().unwrap();
    assert!(!released.load(Ordering::SeqCst));

    drop(stream);
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn exhaustion_releases_the_transport() {
    let released = Arc::new(AtomicBool::new(false));
    let flag = ReleaseFlag(Arc::clone(&released));
    let source: DecodedEventStream = Box::pin(async_stream::stream! {
        let _flag = flag;
        yield Ok(vec![DeltaEvent::text(0usize, "done").into()]);
    });

    let mut stream = StreamedResponse::new("gpt-4o", chrono::Utc::now(), source);
    stream.ensure_exhausted().await.unwrap();

    assert!(released.load(Ordering::SeqCst));
    assert_eq!(stream.get().text(), "done");
}

#[tokio::test]
async fn lazy_source_opens_once_and_replays() {
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opened);
    let mut stream = StreamedResponse::lazy("claude", chrono::Utc::now(), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        batches(vec![
            Ok(vec![DeltaEvent::thinking("t", "hmm").into()]),
            Ok(vec![DeltaEvent::text("c", "answer").into()]),
        ])
    });
    assert_eq!(opened.load(Ordering::SeqCst), 0);
    assert_eq!(stream.state(), StreamState::Idle);

    let first: Vec<_> = stream.events().collect().await;
    let second: Vec<_> = stream.events().collect().await;

    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(stream.replay().len(), 2);
}

#[tokio::test]
async fn snapshot_handle_reads_from_another_task() {
    let mut stream = response(vec![
        Ok(vec![DeltaEvent::text(0usize, "a").into()]),
        Ok(vec![DeltaEvent::text(0usize, "b").into()]),
    ]);
    let handle = stream.snapshot_handle();

    stream.ensure_exhausted().await.unwrap();
    let seen = tokio::spawn(async move { (handle.get().text(), handle.state()) })
        .await
        .unwrap();

    assert_eq!(seen, ("ab".to_string(), StreamState::Exhausted));
}

#[tokio::test]
async fn finish_hook_sees_final_response() {
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let mut stream = response(vec![
        Ok(vec![DeltaEvent::text(0usize, "fin").into()]),
        Ok(vec![DecodedEvent::Usage(Usage::from_tokens(3, 1))]),
    ]);
    stream.on_finish(move |response, usage| {
        *sink.lock().unwrap() = Some((response.text(), usage.response_tokens));
    });

    stream.ensure_exhausted().await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        Some(("fin".to_string(), Some(1)))
    );
}
