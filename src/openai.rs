//! OpenAI-compatible wire types.
//!
//! Inbound request bodies are decoded into these structs once at the HTTP
//! boundary and then checked with [`ChatCompletionRequest::validate`] /
//! [`CompletionRequest::validate`] before any backend call. Outbound response
//! and chunk shapes are serialised from the structs at the bottom of the file.

use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

/// Sampling temperature used when the caller omits one.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Owner reported for every listed model.
pub const MODEL_OWNER: &str = "ollama";

// -----------------------------------------------------------------------
// Requests
// -----------------------------------------------------------------------

/// Speaker of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation. Order within a request is significant.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Body of `POST /v1/chat/completions`.
///
/// Unknown OpenAI fields (`top_p`, `user`, …) are accepted and ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Reject requests that must never reach the backend.
    pub fn validate(&self) -> Result<(), ProxyError> {
        require_model(&self.model)?;
        if self.messages.is_empty() {
            return Err(ProxyError::Validation("`messages` must not be empty".into()));
        }
        require_positive_max_tokens(self.max_tokens)
    }
}

/// Body of `POST /v1/completions`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    /// Reject requests that must never reach the backend.
    pub fn validate(&self) -> Result<(), ProxyError> {
        require_model(&self.model)?;
        if self.prompt.is_empty() {
            return Err(ProxyError::Validation("`prompt` must not be empty".into()));
        }
        require_positive_max_tokens(self.max_tokens)
    }
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn require_model(model: &str) -> Result<(), ProxyError> {
    if model.trim().is_empty() {
        return Err(ProxyError::Validation("`model` must not be empty".into()));
    }
    Ok(())
}

fn require_positive_max_tokens(max_tokens: Option<u32>) -> Result<(), ProxyError> {
    if max_tokens == Some(0) {
        return Err(ProxyError::Validation("`max_tokens` must be a positive integer".into()));
    }
    Ok(())
}

// -----------------------------------------------------------------------
// Responses
// -----------------------------------------------------------------------

/// Why generation stopped. Ollama exposes nothing richer than "it finished".
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
}

/// Token accounting. Always zero: this layer does not count tokens.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// `GET /v1/models` envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelInfo>,
}

/// One entry of [`ModelList`].
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
}

/// Buffered `chat.completion` response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantMessage {
    pub role: Role,
    pub content: String,
}

/// Streamed `chat.completion.chunk`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<FinishReason>,
}

/// Incremental content. Serialises as `{}` on the terminal chunk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// `text_completion` object, used both buffered (with `usage`) and as a
/// streamed chunk (without).
#[derive(Debug, Clone, Serialize)]
pub struct TextCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<TextChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextChoice {
    pub index: u32,
    pub text: String,
    pub finish_reason: Option<FinishReason>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chat(body: serde_json::Value) -> ChatCompletionRequest {
        serde_json::from_value(body).expect("request should decode")
    }

    // -----------------------------------------------------------------------
    // decoding
    // -----------------------------------------------------------------------

    #[test]
    fn chat_request_applies_defaults() {
        let req = chat(json!({
            "model": "llama3",
            "messages": [{ "role": "user", "content": "hi" }],
        }));
        assert_eq!(req.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(req.max_tokens, None);
        assert!(!req.stream);
    }

    #[test]
    fn chat_request_ignores_unknown_openai_fields() {
        let req = chat(json!({
            "model": "llama3",
            "messages": [{ "role": "user", "content": "hi" }],
            "top_p": 0.9,
            "user": "abc",
        }));
        assert_eq!(req.model, "llama3");
    }

    #[test]
    fn chat_request_rejects_unknown_role() {
        let result: Result<ChatCompletionRequest, _> = serde_json::from_value(json!({
            "model": "llama3",
            "messages": [{ "role": "wizard", "content": "hi" }],
        }));
        assert!(result.is_err());
    }

    // -----------------------------------------------------------------------
    // validation
    // -----------------------------------------------------------------------

    #[test]
    fn chat_validation_rejects_empty_messages() {
        let req = chat(json!({ "model": "llama3", "messages": [] }));
        assert!(matches!(req.validate(), Err(ProxyError::Validation(_))));
    }

    #[test]
    fn chat_validation_rejects_blank_model() {
        let req = chat(json!({
            "model": "  ",
            "messages": [{ "role": "user", "content": "hi" }],
        }));
        assert!(matches!(req.validate(), Err(ProxyError::Validation(_))));
    }

    #[test]
    fn chat_validation_rejects_zero_max_tokens() {
        let req = chat(json!({
            "model": "llama3",
            "messages": [{ "role": "user", "content": "hi" }],
            "max_tokens": 0,
        }));
        assert!(req.validate().is_err());
    }

    #[test]
    fn completion_validation_rejects_empty_prompt() {
        let req: CompletionRequest =
            serde_json::from_value(json!({ "model": "llama3", "prompt": "" })).unwrap();
        assert!(matches!(req.validate(), Err(ProxyError::Validation(_))));
    }

    #[test]
    fn completion_validation_accepts_minimal_request() {
        let req: CompletionRequest =
            serde_json::from_value(json!({ "model": "llama3", "prompt": "Once upon" })).unwrap();
        assert!(req.validate().is_ok());
    }

    // -----------------------------------------------------------------------
    // serialisation
    // -----------------------------------------------------------------------

    #[test]
    fn terminal_delta_serialises_as_empty_object() {
        let choice = ChunkChoice {
            index: 0,
            delta: Delta::default(),
            finish_reason: Some(FinishReason::Stop),
        };
        let v = serde_json::to_value(choice).unwrap();
        assert_eq!(v["delta"], json!({}));
        assert_eq!(v["finish_reason"], "stop");
    }

    #[test]
    fn open_chunk_serialises_null_finish_reason() {
        let choice = ChunkChoice {
            index: 0,
            delta: Delta { content: Some("Hel".into()) },
            finish_reason: None,
        };
        let v = serde_json::to_value(choice).unwrap();
        assert!(v["finish_reason"].is_null());
        assert!(v.as_object().unwrap().contains_key("finish_reason"));
    }
}
