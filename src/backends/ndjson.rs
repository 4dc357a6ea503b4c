//! Newline-delimited JSON framing for Ollama's streamed responses.
//!
//! Ollama streams one JSON object per line. [`NdjsonCodec`] is a
//! [`Decoder`] that cuts the byte stream at `\n` and decodes each line into a
//! typed [`StreamLine`]. Blank or malformed lines are skipped rather than
//! surfaced: transport noise must not abort an otherwise healthy stream.
//!
//! [`from_byte_stream`] wires the codec to any byte stream (in practice a
//! `reqwest` body) and produces a [`LineStream`] that ends right after the
//! first `done` line.

use std::{error::Error as StdError, io, marker::PhantomData, pin::Pin};

use bytes::{Bytes, BytesMut};
use futures_util::{future, Stream, StreamExt as _, TryStreamExt as _};
use serde::de::DeserializeOwned;
use tokio_util::{
    codec::{Decoder, FramedRead},
    io::StreamReader,
};
use tracing::debug;

use super::ollama::StreamLine;
use crate::error::ProxyError;

/// Lazy, single-pass sequence of decoded backend lines.
///
/// Dropping it drops the underlying HTTP response and closes the connection.
pub type LineStream<T> = Pin<Box<dyn Stream<Item = Result<T, ProxyError>> + Send>>;

/// Longest backend line accepted before the stream is failed. Ollama's final
/// `/api/generate` line carries the whole context array, so this is generous.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Decodes one `T` per `\n`-terminated line.
pub struct NdjsonCodec<T> {
    /// Bytes of the current partial line already scanned for `\n`.
    next_index: usize,
    max_length: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> NdjsonCodec<T> {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Codec that fails with [`io::ErrorKind::InvalidData`] once a line
    /// (without its newline) exceeds `max_length` bytes.
    pub fn with_max_length(max_length: usize) -> Self {
        Self { next_index: 0, max_length, _marker: PhantomData }
    }

    fn too_long(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("backend line exceeds {} bytes", self.max_length),
        )
    }
}

impl<T> Default for NdjsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Decoder for NdjsonCodec<T> {
    type Item = T;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<T>, io::Error> {
        loop {
            let Some(offset) = buf[self.next_index..].iter().position(|b| *b == b'\n') else {
                if buf.len() > self.max_length {
                    return Err(self.too_long());
                }
                self.next_index = buf.len();
                return Ok(None);
            };
            if self.next_index + offset > self.max_length {
                return Err(self.too_long());
            }
            let line = buf.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            if let Some(item) = parse_line(&line[..line.len() - 1]) {
                return Ok(Some(item));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<T>, io::Error> {
        if let Some(item) = self.decode(buf)? {
            return Ok(Some(item));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        // Final line without a trailing newline.
        let line = buf.split();
        Ok(parse_line(&line))
    }
}

fn parse_line<T: DeserializeOwned>(raw: &[u8]) -> Option<T> {
    let line = raw.trim_ascii();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_slice(line) {
        Ok(item) => Some(item),
        Err(e) => {
            debug!(error = %e, line = %String::from_utf8_lossy(line), "skipping malformed backend line");
            None
        }
    }
}

/// Frame a raw byte stream into a [`LineStream`].
///
/// The stream yields every decoded line in arrival order and stops after the
/// first line whose `done` flag is set, or when the byte stream ends. A
/// transport failure is yielded once as [`ProxyError::BackendUnreachable`] and
/// ends the stream; an oversized line does the same as
/// [`ProxyError::Translation`].
pub fn from_byte_stream<S, E, T>(bytes: S) -> LineStream<T>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync>> + 'static,
    T: StreamLine,
{
    let reader = StreamReader::new(bytes.map_err(io::Error::other));
    let lines = FramedRead::new(reader, NdjsonCodec::<T>::new())
        .map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => ProxyError::Translation(e.to_string()),
            _ => ProxyError::BackendUnreachable(format!("stream interrupted: {e}")),
        })
        .scan(false, |finished, item| {
            if *finished {
                return future::ready(None);
            }
            *finished = match &item {
                Ok(line) => line.is_done(),
                Err(_) => true,
            };
            future::ready(Some(item))
        });
    Box::pin(lines)
}

/// Frame a streamed `reqwest` response body.
pub fn from_response<T: StreamLine>(response: reqwest::Response) -> LineStream<T> {
    from_byte_stream(response.bytes_stream())
}
