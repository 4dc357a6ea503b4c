//! NDJSON → SSE re-framing.
//!
//! [`sse_stream`] turns a [`LineStream`] of backend lines into OpenAI-style SSE
//! frames. It pulls exactly one backend line per step and never reads ahead, so
//! each chunk reaches the caller as soon as its line arrives and dropping the
//! returned stream (caller disconnect) drops the backend connection with it.
//!
//! Frame sequence for a healthy stream:
//!
//! ```text
//! data: {chunk for line 1}
//! data: {chunk for line 2}
//! ...
//! data: {terminal chunk, finish_reason "stop"}
//! data: [DONE]
//! ```
//!
//! A backend that closes without a `done` line still gets the terminal chunk
//! and `[DONE]`. A failure (transport error, or an `{"error": …}` line) emits
//! one error frame and ends the stream without `[DONE]`.

use std::{collections::VecDeque, convert::Infallible, pin::Pin};

use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt as _};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{sse_frame, DONE_FRAME};
use crate::backends::{ndjson::LineStream, ollama::StreamLine};

/// Body stream handed to axum. Errors are reported in-band, never as stream
/// errors, because the response headers are already on the wire.
pub type SseStream = Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>;

/// Per-endpoint chunk shapes.
pub trait ChunkMapper: Send + 'static {
    /// Backend line type consumed.
    type Line: StreamLine;
    /// OpenAI chunk type produced.
    type Chunk: Serialize;

    /// Chunk carrying one text fragment.
    fn content_chunk(&self, text: &str) -> Self::Chunk;

    /// Final chunk: no content, `finish_reason: "stop"`.
    fn terminal_chunk(&self) -> Self::Chunk;
}

/// Re-frame `lines` as SSE using `mapper`.
pub fn sse_stream<M: ChunkMapper>(lines: LineStream<M::Line>, mapper: M) -> SseStream {
    let state = Reframer {
        lines,
        mapper,
        pending: VecDeque::with_capacity(3),
        finished: false,
        chunks: 0,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                return Some((Ok(frame), state));
            }
            if state.finished {
                return None;
            }
            state.advance().await;
        }
    }))
}

struct Reframer<M: ChunkMapper> {
    lines: LineStream<M::Line>,
    mapper: M,
    /// Frames produced by the last backend line, not yet yielded.
    pending: VecDeque<Bytes>,
    finished: bool,
    chunks: usize,
}

impl<M: ChunkMapper> Reframer<M> {
    /// Consume one backend line and queue the frames it maps to.
    async fn advance(&mut self) {
        match self.lines.next().await {
            Some(Ok(line)) => {
                if let Some(message) = line.error() {
                    warn!(error = %message, chunks = self.chunks, "Ollama reported an error mid-stream");
                    self.fail(json!({ "error": { "message": message, "type": "backend_error" } }));
                } else if line.is_done() {
                    if !line.content().is_empty() {
                        self.push_content(line.content());
                    }
                    self.finish();
                } else {
                    self.push_content(line.content());
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, chunks = self.chunks, "backend stream failed");
                self.fail(e.to_body());
            }
            None => {
                debug!(chunks = self.chunks, "backend closed stream without a done line");
                self.finish();
            }
        }
    }

    fn push_content(&mut self, text: &str) {
        self.chunks += 1;
        self.pending.push_back(sse_frame(&self.mapper.content_chunk(text)));
    }

    fn finish(&mut self) {
        self.pending.push_back(sse_frame(&self.mapper.terminal_chunk()));
        self.pending.push_back(Bytes::from_static(DONE_FRAME.as_bytes()));
        self.finished = true;
        debug!(chunks = self.chunks, "stream complete");
    }

    fn fail(&mut self, body: serde_json::Value) {
        self.pending.push_back(sse_frame(&body));
        self.finished = true;
    }
}

impl<M: ChunkMapper> Drop for Reframer<M> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(chunks = self.chunks, "caller went away mid-stream: closing backend stream");
        }
    }
}
