//! Server-sent event framing.
//!
//! HTTP chunk boundaries do not line up with SSE lines, so the framer buffers
//! bytes until a full line arrives and emits a frame at each blank line.

use crate::llm::error::ModelError;
use crate::llm::streaming::RawEventStream;
use futures::StreamExt;

/// One SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Event type from the `event:` line
    pub event: Option<String>,
    /// Data payload; multiple `data:` lines are joined with `\n`
    pub data: String,
}

impl SseFrame {
    /// Returns true for the OpenAI end-of-stream sentinel.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incremental SSE parser.
#[derive(Debug, Default)]
pub struct SseFramer {
    buffer: Vec<u8>,
    current: SseFrame,
    has_field: bool,
}

impl SseFramer {
    /// Creates an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes and returns every frame completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a final frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            if let Some(frame) = self.line(&line) {
                return Some(frame);
            }
        }
        self.take_frame()
    }

    fn line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.take_frame();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => {
                self.current.event = Some(value.to_string());
                self.has_field = true;
            }
            "data" => {
                if self.has_data() {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
                self.has_field = true;
            }
            _ => {}
        }
        None
    }

    fn has_data(&self) -> bool {
        !self.current.data.is_empty()
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if !self.has_field {
            return None;
        }
        self.has_field = false;
        Some(std::mem::take(&mut self.current))
    }
}

/// Frames the body of an HTTP response as SSE.
///
/// The response body is dropped, closing the connection, when the returned
/// stream is dropped.
pub fn sse_frames(response: reqwest::Response) -> RawEventStream<SseFrame> {
    let mut body = response.bytes_stream();
    Box::pin(async_stream::stream! {
        let mut framer = SseFramer::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in framer.push(&bytes) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(ModelError::transport(format!("failed to read stream: {e}")));
                    return;
                }
            }
        }
        if let Some(frame) = framer.finish() {
            yield Ok(frame);
        }
    })
}

/// Frames recorded SSE text, e.g. a captured provider response.
#[must_use]
pub fn sse_frames_from_text(text: &str) -> RawEventStream<SseFrame> {
    let mut framer = SseFramer::new();
    let mut frames: Vec<Result<SseFrame, ModelError>> =
        framer.push(text.as_bytes()).into_iter().map(Ok).collect();
    frames.extend(framer.finish().map(Ok));
    Box::pin(futures::stream::iter(frames))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_split_across_chunks() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"event: ping\nda").is_empty());
        let frames = framer.push(b"ta: {\"a\":1}\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("ping"));
        assert_eq!(frames[0].data, "{\"a\":1}");
    }

    #[test]
    fn multiline_data_is_joined() {
        let mut framer = SseFramer::new();
        let frames = framer.push(b"data: one\ndata: two\n\n");
        assert_eq!(frames[0].data, "one\ntwo");
    }

    #[test]
    fn comments_and_crlf_are_handled() {
        let mut framer = SseFramer::new();
        let frames = framer.push(b": keep-alive\r\n\r\ndata: x\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn multibyte_characters_split_across_chunks() {
        let text = "data: héllo\n\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xc3).unwrap() + 1;

        let mut framer = SseFramer::new();
        assert!(framer.push(&text[..split]).is_empty());
        let frames = framer.push(&text[split..]);
        assert_eq!(frames[0].data, "héllo");
    }

    #[test]
    fn finish_flushes_unterminated_frame() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: [DONE]").is_empty());
        let frame = framer.finish().unwrap();
        assert!(frame.is_done());
    }

    #[test]
    fn recorded_text_yields_frames() {
        let frames: Vec<_> =
            tokio_test::block_on(sse_frames_from_text("data: a\n\ndata: b\n\n").collect());
        assert_eq!(frames.len(), 2);
        tokio_test::assert_ok!(&frames[1]);
    }
}
