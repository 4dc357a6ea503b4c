//! Schema translation between OpenAI-compatible shapes and Ollama's native API.
//!
//! Everything in this module is pure: functions take decoded values and return
//! new ones, and the only side effects are reading the clock and generating
//! ids. I/O is left to [`crate::backends`]; orchestration to [`crate::proxy`].
//!
//! | Concern | OpenAI | Ollama |
//! |---|---|---|
//! | Max tokens | `max_tokens` | `options.num_predict` |
//! | Temperature | `temperature` | `options.temperature` |
//! | Chat reply | `choices[0].message.content` | `message.content` |
//! | Completion reply | `choices[0].text` | `response` |
//! | Streaming | SSE `data:` frames + `[DONE]` | NDJSON lines, last has `done: true` |
//! | Usage | token counts | not mapped: always zero |

pub mod chat;
pub mod completions;
pub mod models;
pub mod stream;

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::backends::ollama::Options;

/// Identity shared by a response and, when streaming, by every one of its
/// chunks. Assigned once, before the first chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub id: String,
    pub created: i64,
    pub model: String,
}

impl ResponseMeta {
    /// Identity for a chat completion (`chatcmpl-…`).
    pub fn chat(model: &str) -> Self {
        Self::with_prefix("chatcmpl", model)
    }

    /// Identity for a text completion (`cmpl-…`).
    pub fn completion(model: &str) -> Self {
        Self::with_prefix("cmpl", model)
    }

    fn with_prefix(prefix: &str, model: &str) -> Self {
        Self {
            id: format!("{prefix}-{}", Uuid::new_v4().simple()),
            created: unix_now(),
            model: model.to_string(),
        }
    }
}

/// Current wall-clock time as a unix timestamp.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Map the shared sampling fields. `max_tokens` becomes `num_predict` only
/// when the caller set it.
pub(crate) fn options(temperature: f64, max_tokens: Option<u32>) -> Options {
    Options { temperature, num_predict: max_tokens }
}

/// The literal frame that terminates every successful stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Encode one value as an SSE `data:` frame.
pub fn sse_frame<T: Serialize>(payload: &T) -> Bytes {
    let json = serde_json::to_string(payload).unwrap_or_else(|e| {
        serde_json::json!({ "error": { "message": e.to_string(), "type": "translation_error" } })
            .to_string()
    });
    Bytes::from(format!("data: {json}\n\n"))
}
