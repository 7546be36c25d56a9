//! Downstream side of the SSE relay.
//!
//! [`RelayStream`] wraps the upstream body and is handed to axum as the
//! response body. It forwards each upstream chunk unchanged and owns the only
//! handle to the upstream connection, so the connection lives exactly as long
//! as the downstream response:
//!
//! - upstream end: log totals, end the body.
//! - upstream read error: log, end the body cleanly without another write.
//! - client disconnect: hyper drops the body, which drops the upstream stream
//!   and releases the connection in the same step.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Instant;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn, Span};

use crate::gateway::UpstreamStream;

/// Bytes of the first chunk echoed to the debug log.
const FIRST_CHUNK_PREVIEW: usize = 100;

pub struct RelayStream {
    upstream: Option<UpstreamStream>,
    span: Span,
    chunks: usize,
    bytes: usize,
    started: Instant,
}

impl RelayStream {
    /// Wrap `upstream`; log records are attached to the current span.
    pub fn new(upstream: UpstreamStream) -> Self {
        Self {
            upstream: Some(upstream),
            span: Span::current(),
            chunks: 0,
            bytes: 0,
            started: Instant::now(),
        }
    }
}

impl Stream for RelayStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(upstream) = this.upstream.as_mut() else {
            return Poll::Ready(None);
        };

        let next = ready!(upstream.poll_next_unpin(cx));
        let _enter = this.span.enter();
        match next {
            Some(Ok(chunk)) => {
                this.chunks += 1;
                this.bytes += chunk.len();
                if this.chunks == 1 {
                    let preview = &chunk[..chunk.len().min(FIRST_CHUNK_PREVIEW)];
                    debug!(preview = %String::from_utf8_lossy(preview), "first upstream chunk");
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => {
                warn!(
                    error = %e,
                    chunks = this.chunks,
                    bytes = this.bytes,
                    "upstream stream failed; closing downstream response"
                );
                this.upstream = None;
                Poll::Ready(None)
            }
            None => {
                info!(
                    chunks = this.chunks,
                    bytes = this.bytes,
                    duration_ms = this.started.elapsed().as_millis() as u64,
                    "stream completed"
                );
                this.upstream = None;
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for RelayStream {
    fn drop(&mut self) {
        // Still holding the upstream here means the body was dropped before
        // the stream ended, i.e. the client went away.
        if self.upstream.take().is_some() {
            let _enter = self.span.enter();
            info!(
                chunks = self.chunks,
                bytes = self.bytes,
                "client disconnected; upstream stream cancelled"
            );
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
