//! SSE stream decoder.
//!
//! [`SseLineDecoder`] is the synchronous core: feed it bytes in whatever
//! chunks the network delivers and it hands back one [`SseEvent`] per complete
//! `data:` line. [`decode_fragments`] wraps it around a byte stream to give a
//! lazy, forward-only stream of text fragments.
//!
//! Decoding is deliberately forgiving. Gateways interleave keep-alive comments
//! and occasionally non-JSON payloads; such lines are skipped. Only an
//! explicit `{"error": ...}` record ends the stream early.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use muz_types::{StreamChunk, DATA_PREFIX, DONE_SENTINEL};
use tracing::warn;

use crate::error::ClientError;

/// One meaningful record decoded from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Incremental assistant text.
    Fragment(String),
    /// An `{"error": {...}}` record; the stream carries nothing after it.
    Error(String),
    /// The `[DONE]` terminator.
    Done,
}

/// Longest unterminated line kept in memory. Longer lines are dropped.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Incremental line splitter and record decoder.
///
/// Bytes are buffered until a `\n` arrives, so records and multi-byte UTF-8
/// sequences split across network chunks are reassembled before decoding.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no `\n`.
    scanned: usize,
    /// Discarding the rest of an over-long line.
    overflowed: bool,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the events of every line it completed.
    ///
    /// Decoding stops at `[DONE]` or an error record: it is the last event
    /// returned and anything after it is discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            self.scanned = end + 1;
            let event = if self.overflowed {
                self.overflowed = false;
                None
            } else {
                decode_line(&self.buffer[start..end])
            };
            start = end + 1;

            match event {
                Some(last @ (SseEvent::Done | SseEvent::Error(_))) => {
                    self.buffer.clear();
                    self.scanned = 0;
                    events.push(last);
                    return events;
                }
                Some(event) => events.push(event),
                None => {}
            }
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        if self.buffer.len() > MAX_LINE_BYTES {
            warn!(bytes = self.buffer.len(), "stream line exceeds limit; discarding it");
            self.buffer.clear();
            self.scanned = 0;
            self.overflowed = true;
        }
        events
    }

    /// Bytes of the trailing, not yet terminated line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Decode one line (without its `\n`).
fn decode_line(line: &[u8]) -> Option<SseEvent> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let line = String::from_utf8_lossy(line);
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == DONE_SENTINEL {
        return Some(SseEvent::Done);
    }
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => match chunk.error_message() {
            Some(message) => {
                warn!(error = %message, "gateway reported an error mid-stream");
                Some(SseEvent::Error(message))
            }
            None => chunk.content().map(|c| SseEvent::Fragment(c.to_owned())),
        },
        Err(e) => {
            warn!(error = %e, data = %payload, "skipping malformed stream record");
            None
        }
    }
}

struct DecodeState<S> {
    /// `None` once the byte stream ended, failed or was terminated.
    bytes: Option<S>,
    decoder: SseLineDecoder,
    ready: VecDeque<Result<String, ClientError>>,
    fragments: usize,
}

impl<S> DecodeState<S> {
    fn finish(&mut self) {
        self.bytes = None;
    }
}

/// Lazily decode a relayed SSE body into text fragments.
///
/// The stream ends at `[DONE]` or when the body ends, whichever comes first.
/// A body that ends without `[DONE]` after some text is treated as complete;
/// one that ends without any text yields [`ClientError::EmptyStream`]. A
/// transport error or an in-stream error record is yielded once and then the
/// stream ends. The byte stream is dropped as soon as it is no longer
/// needed, which releases the connection.
pub fn decode_fragments<S>(bytes: S) -> BoxStream<'static, Result<String, ClientError>>
where
    S: Stream<Item = Result<Bytes, ClientError>> + Unpin + Send + 'static,
{
    let state = DecodeState {
        bytes: Some(bytes),
        decoder: SseLineDecoder::new(),
        ready: VecDeque::new(),
        fragments: 0,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.ready.pop_front() {
                return Some((item, st));
            }
            let bytes = st.bytes.as_mut()?;
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    for event in st.decoder.push(&chunk) {
                        match event {
                            SseEvent::Fragment(f) => {
                                st.fragments += 1;
                                st.ready.push_back(Ok(f));
                            }
                            SseEvent::Error(message) => {
                                st.ready.push_back(Err(ClientError::Upstream(message)));
                                st.finish();
                            }
                            SseEvent::Done => st.finish(),
                        }
                    }
                }
                Some(Err(e)) => {
                    st.finish();
                    return Some((Err(e), st));
                }
                None => {
                    if st.decoder.pending() > 0 {
                        warn!(bytes = st.decoder.pending(), "stream ended mid-line; discarding partial record");
                    }
                    st.finish();
                    if st.fragments == 0 {
                        warn!("stream ended without [DONE] and without content");
                        return Some((Err(ClientError::EmptyStream), st));
                    }
                }
            }
        }
    })
    .boxed()
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use tracing_test::traced_test;

    fn record(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    fn byte_stream(chunks: Vec<Result<Vec<u8>, ClientError>>) -> BoxStream<'static, Result<Bytes, ClientError>> {
        stream::iter(chunks.into_iter().map(|c| c.map(Bytes::from))).boxed()
    }

    async fn collect(chunks: Vec<&str>) -> Vec<String> {
        let chunks = chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        decode_fragments(byte_stream(chunks))
            .map(|r| r.expect("no transport error"))
            .collect()
            .await
    }

    #[tokio::test]
    async fn yields_fragment_then_stops_at_done() {
        let out = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;
        assert_eq!(out, vec!["Hi"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn malformed_record_is_skipped_between_valid_ones() {
        let first = record("one");
        let second = record("two");
        let out = collect(vec![&first, "data: not-json\n\n", &second, "data: [DONE]\n\n"]).await;
        assert_eq!(out, vec!["one", "two"]);
        assert!(logs_contain("skipping malformed stream record"));
    }

    #[tokio::test]
    async fn records_after_done_are_ignored() {
        let after = record("late");
        let body = format!("{}data: [DONE]\n\n{}", record("early"), after);
        let out = collect(vec![&body]).await;
        assert_eq!(out, vec!["early"]);
    }

    #[tokio::test]
    async fn record_split_across_chunks_is_reassembled() {
        let full = record("split");
        let (a, b) = full.split_at(17);
        let out = collect(vec![a, b, "data: [DONE]\n\n"]).await;
        assert_eq!(out, vec!["split"]);
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks_survives() {
        let full = record("héllo ✓").into_bytes();
        let cut = full
            .windows("✓".len())
            .position(|w| w == "✓".as_bytes())
            .unwrap()
            + 1;
        let chunks = vec![Ok(full[..cut].to_vec()), Ok(full[cut..].to_vec())];
        let out: Vec<String> = decode_fragments(byte_stream(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["héllo ✓"]);
    }

    #[tokio::test]
    async fn comments_roles_and_crlf_are_handled() {
        let out = collect(vec![
            ": OPENROUTER PROCESSING\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\r\n\r\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\r\n\r\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\r\n\r\n",
        ])
        .await;
        assert_eq!(out, vec!["ok"]);
    }

    #[tokio::test]
    async fn truncated_stream_ends_with_partial_content() {
        let first = record("partial");
        let out = collect(vec![&first, "data: {\"choices\":[{\"de"]).await;
        assert_eq!(out, vec!["partial"]);
    }

    #[tokio::test]
    async fn transport_error_is_yielded_once_then_stream_ends() {
        let chunks = vec![
            Ok(record("before").into_bytes()),
            Err(ClientError::Transport("reset".into())),
            Ok(record("after").into_bytes()),
        ];
        let out: Vec<Result<String, ClientError>> = decode_fragments(byte_stream(chunks)).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "before");
        assert!(matches!(out[1], Err(ClientError::Transport(_))));
    }

    #[tokio::test]
    #[traced_test]
    async fn error_record_ends_stream_with_upstream_error() {
        let chunks = vec![
            Ok(b"data: {\"error\":{\"message\":\"provider overloaded\",\"code\":502}}\n\n".to_vec()),
            Ok(record("ignored").into_bytes()),
        ];
        let out: Vec<Result<String, ClientError>> = decode_fragments(byte_stream(chunks)).collect().await;
        assert_eq!(out.len(), 1);
        match &out[0] {
            Err(ClientError::Upstream(message)) => {
                assert_eq!(message, "provider overloaded (code 502)")
            }
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(logs_contain("gateway reported an error mid-stream"));
    }

    #[tokio::test]
    async fn body_without_done_or_text_is_an_empty_stream() {
        let chunks = vec![Ok(b": keep-alive\n\n".to_vec())];
        let out: Vec<Result<String, ClientError>> = decode_fragments(byte_stream(chunks)).collect().await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(ClientError::EmptyStream)));

        let none: Vec<Result<String, ClientError>> = decode_fragments(byte_stream(Vec::new())).collect().await;
        assert!(matches!(none.as_slice(), [Err(ClientError::EmptyStream)]));
    }

    #[tokio::test]
    async fn done_without_text_is_a_clean_end() {
        let out = collect(vec!["data: [DONE]\n\n"]).await;
        assert!(out.is_empty());
    }

    #[test]
    fn long_line_in_small_chunks_is_scanned_incrementally() {
        let full = record(&"x".repeat(10_000)).into_bytes();
        let mut decoder = SseLineDecoder::new();
        let mut events = Vec::new();
        for piece in full.chunks(7) {
            events.extend(decoder.push(piece));
            assert!(decoder.scanned <= decoder.buffer.len());
        }
        assert_eq!(events, vec![SseEvent::Fragment("x".repeat(10_000))]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    #[traced_test]
    fn over_long_line_is_dropped_and_decoding_resumes() {
        let mut decoder = SseLineDecoder::new();
        let junk = vec![b'a'; MAX_LINE_BYTES + 1];
        assert!(decoder.push(b"data: ").is_empty());
        assert!(decoder.push(&junk).is_empty());
        assert_eq!(decoder.pending(), 0);
        assert!(logs_contain("stream line exceeds limit"));

        // The tail of the dropped line is skipped, the next record decodes.
        let mut tail = b"aaaa\n".to_vec();
        tail.extend_from_slice(record("next").as_bytes());
        assert_eq!(decoder.push(&tail), vec![SseEvent::Fragment("next".into())]);
    }

    #[test]
    fn line_decoder_keeps_partial_line() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":").is_empty());
        assert!(decoder.pending() > 0);
        let events = decoder.push(b"{\"content\":\"x\"}}]}\n");
        assert_eq!(events, vec![SseEvent::Fragment("x".into())]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn data_prefix_without_space_is_accepted() {
        let mut decoder = SseLineDecoder::new();
        let events = decoder.push(b"data:[DONE]\n");
        assert_eq!(events, vec![SseEvent::Done]);
    }
}
