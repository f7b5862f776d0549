//! Server-Sent-Events relay.
//!
//! Framing sent to the caller:
//! ```text
//! {"success":true,"response_status":200,...}\n
//! <upstream bytes, verbatim>
//! ```
//! The preamble commits the response as successful. A failure after that
//! point can only end the stream early.

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use reqwest::Response;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};

use crate::forward::envelope::StreamingEnvelope;
use crate::observability::metrics;

/// Largest piece handed to the caller per write.
pub const RELAY_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upstream stream failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("stream deadline exceeded")]
    Deadline,
}

/// `text/event-stream` delivered incrementally: chunked, or with no
/// Content-Length at all.
pub fn is_event_stream(headers: &HeaderMap) -> bool {
    let is_sse = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/event-stream"));
    if !is_sse {
        return false;
    }

    let chunked = headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|te| te.to_ascii_lowercase().contains("chunked"));

    chunked || !headers.contains_key(CONTENT_LENGTH)
}

/// An established event-stream response waiting to be relayed.
pub struct EventStreamRelay {
    metadata: StreamingEnvelope,
    upstream: Response,
    deadline: Instant,
}

struct RelayState {
    upstream: Response,
    deadline: Instant,
    pending: Bytes,
    relayed: u64,
    done: bool,
}

impl EventStreamRelay {
    pub fn new(upstream: Response, deadline: Instant) -> Self {
        let metadata = StreamingEnvelope::from_upstream(upstream.status().as_u16(), upstream.headers());
        Self {
            metadata,
            upstream,
            deadline,
        }
    }

    pub fn metadata(&self) -> &StreamingEnvelope {
        &self.metadata
    }

    /// Compact metadata JSON followed by the separator newline.
    pub fn preamble(&self) -> Result<Bytes, serde_json::Error> {
        let mut line = serde_json::to_vec(&self.metadata)?;
        line.push(b'\n');
        Ok(Bytes::from(line))
    }

    /// Preamble first, then the upstream body in pieces of at most
    /// [`RELAY_CHUNK_SIZE`]. Yields one `Err` and stops on failure.
    pub fn into_stream(
        self,
    ) -> Result<impl Stream<Item = Result<Bytes, RelayError>> + Send + 'static, serde_json::Error> {
        let preamble = self.preamble()?;
        let state = RelayState {
            upstream: self.upstream,
            deadline: self.deadline,
            pending: Bytes::new(),
            relayed: 0,
            done: false,
        };

        let body = stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                if !state.pending.is_empty() {
                    let len = state.pending.len().min(RELAY_CHUNK_SIZE);
                    let piece = state.pending.split_to(len);
                    state.relayed += len as u64;
                    metrics::record_stream_bytes(len);
                    return Some((Ok(piece), state));
                }

                match timeout_at(state.deadline, state.upstream.chunk()).await {
                    Ok(Ok(Some(chunk))) => state.pending = chunk,
                    Ok(Ok(None)) => {
                        tracing::debug!(bytes = state.relayed, "Event stream finished");
                        return None;
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(bytes = state.relayed, error = %err, "Event stream aborted by upstream");
                        state.done = true;
                        return Some((Err(RelayError::Upstream(err)), state));
                    }
                    Err(_) => {
                        tracing::warn!(bytes = state.relayed, "Event stream exceeded its deadline");
                        state.done = true;
                        return Some((Err(RelayError::Deadline), state));
                    }
                }
            }
        });

        Ok(stream::once(async move { Ok(preamble) }).chain(body))
    }
}
