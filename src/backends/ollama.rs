//! Ollama native API types (`/api/chat`, `/api/generate`, `/api/tags`,
//! `/api/version`).
//!
//! Only the fields this proxy reads or writes are modelled; everything else in
//! Ollama's payloads (durations, eval counts, `context`, …) is ignored on
//! decode.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::openai::Role;

/// Sampling options forwarded under `options`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Options {
    pub temperature: f64,
    /// Ollama's name for `max_tokens`. Omitted entirely when not requested so
    /// the model's own default applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

/// Message sent to `/api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// `POST /api/chat` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    pub options: Options,
}

/// `POST /api/generate` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub options: Options,
}

/// `GET /api/tags` response.
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<Tag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub name: String,
}

/// `GET /api/version` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionResponse {
    #[serde(default)]
    pub version: String,
}

/// Assistant message inside a chat response or chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: String,
}

/// Buffered `/api/chat` response. A body without `message` is not a chat
/// response and fails to decode.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ResponseMessage,
}

/// Buffered `/api/generate` response.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
}

/// One newline-delimited object of a streamed backend response.
pub trait StreamLine: DeserializeOwned + Send + 'static {
    /// Text fragment carried by this line (may be empty).
    fn content(&self) -> &str;
    /// Set on the last line of a stream.
    fn is_done(&self) -> bool;
    /// Ollama reports mid-stream failures as `{"error": "..."}` lines.
    fn error(&self) -> Option<&str>;
}

/// One line of a streamed `/api/chat` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: ResponseMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl StreamLine for ChatChunk {
    fn content(&self) -> &str {
        &self.message.content
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// One line of a streamed `/api/generate` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl StreamLine for GenerateChunk {
    fn content(&self) -> &str {
        &self.response
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
