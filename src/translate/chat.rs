//! Chat completions: `/v1/chat/completions` ⇄ `/api/chat`.

use super::{options, stream::ChunkMapper, ResponseMeta};
use crate::{
    backends::ollama::{self, ChatChunk, ChatResponse},
    openai::{
        AssistantMessage, ChatChoice, ChatCompletion, ChatCompletionChunk,
        ChatCompletionRequest, ChunkChoice, Delta, FinishReason, Role, Usage,
    },
};

/// Build the `/api/chat` body. Messages map 1:1 and keep their order.
pub fn to_ollama(request: &ChatCompletionRequest) -> ollama::ChatRequest {
    ollama::ChatRequest {
        model: request.model.clone(),
        messages: request
            .messages
            .iter()
            .map(|m| ollama::Message { role: m.role, content: m.content.clone() })
            .collect(),
        stream: request.stream,
        options: options(request.temperature, request.max_tokens),
    }
}

/// Wrap a buffered `/api/chat` reply as a `chat.completion`.
pub fn from_ollama(response: ChatResponse, meta: ResponseMeta) -> ChatCompletion {
    ChatCompletion {
        id: meta.id,
        object: "chat.completion",
        created: meta.created,
        model: meta.model,
        choices: vec![ChatChoice {
            index: 0,
            message: AssistantMessage {
                role: Role::Assistant,
                content: response.message.content,
            },
            finish_reason: FinishReason::Stop,
        }],
        usage: Usage::default(),
    }
}

/// Produces `chat.completion.chunk` objects that all share one [`ResponseMeta`].
pub struct ChatChunks {
    meta: ResponseMeta,
}

impl ChatChunks {
    pub fn new(meta: ResponseMeta) -> Self {
        Self { meta }
    }

    fn chunk(&self, delta: Delta, finish_reason: Option<FinishReason>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.meta.id.clone(),
            object: "chat.completion.chunk",
            created: self.meta.created,
            model: self.meta.model.clone(),
            choices: vec![ChunkChoice { index: 0, delta, finish_reason }],
        }
    }
}

impl ChunkMapper for ChatChunks {
    type Line = ChatChunk;
    type Chunk = ChatCompletionChunk;

    fn content_chunk(&self, text: &str) -> ChatCompletionChunk {
        self.chunk(Delta { content: Some(text.to_string()) }, None)
    }

    fn terminal_chunk(&self) -> ChatCompletionChunk {
        self.chunk(Delta::default(), Some(FinishReason::Stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backends::ndjson::LineStream, error::ProxyError, translate::stream::sse_stream};
    use futures_util::StreamExt as _;
    use serde_json::{json, Value};

    fn request(body: Value) -> ChatCompletionRequest {
        serde_json::from_value(body).unwrap()
    }

    fn meta() -> ResponseMeta {
        ResponseMeta { id: "chatcmpl-test".into(), created: 1_700_000_000, model: "llama3".into() }
    }

    // -----------------------------------------------------------------------
    // to_ollama
    // -----------------------------------------------------------------------

    #[test]
    fn messages_map_one_to_one_in_order() {
        let req = request(json!({
            "model": "llama3",
            "messages": [
                { "role": "system", "content": "Be brief." },
                { "role": "user", "content": "Hi" },
                { "role": "assistant", "content": "Hello." },
                { "role": "user", "content": "Again" },
            ],
        }));
        let out = serde_json::to_value(to_ollama(&req)).unwrap();
        assert_eq!(
            out["messages"],
            json!([
                { "role": "system", "content": "Be brief." },
                { "role": "user", "content": "Hi" },
                { "role": "assistant", "content": "Hello." },
                { "role": "user", "content": "Again" },
            ])
        );
    }

    #[test]
    fn temperature_and_stream_are_forwarded() {
        let req = request(json!({
            "model": "llama3",
            "messages": [{ "role": "user", "content": "Hi" }],
            "temperature": 0.2,
            "stream": true,
        }));
        let out = serde_json::to_value(to_ollama(&req)).unwrap();
        assert_eq!(out["model"], "llama3");
        assert_eq!(out["stream"], true);
        assert!((out["options"]["temperature"].as_f64().unwrap() - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn num_predict_is_omitted_without_max_tokens() {
        let req = request(json!({
            "model": "llama3",
            "messages": [{ "role": "user", "content": "Hi" }],
        }));
        let out = serde_json::to_value(to_ollama(&req)).unwrap();
        assert!(out["options"].get("num_predict").is_none(), "options: {}", out["options"]);
    }

    #[test]
    fn num_predict_equals_max_tokens() {
        let req = request(json!({
            "model": "llama3",
            "messages": [{ "role": "user", "content": "Hi" }],
            "max_tokens": 256,
        }));
        let out = serde_json::to_value(to_ollama(&req)).unwrap();
        assert_eq!(out["options"]["num_predict"], 256);
    }

    // -----------------------------------------------------------------------
    // from_ollama
    // -----------------------------------------------------------------------

    #[test]
    fn reply_content_is_passed_through_unmodified() {
        let content = "  Line one\n\nLine two — with unicode ✓  ";
        let resp: ChatResponse = serde_json::from_value(json!({
            "message": { "role": "assistant", "content": content },
            "done": true,
        }))
        .unwrap();
        let out = serde_json::to_value(from_ollama(resp, meta())).unwrap();

        assert_eq!(out["id"], "chatcmpl-test");
        assert_eq!(out["object"], "chat.completion");
        assert_eq!(out["model"], "llama3");
        assert_eq!(out["choices"][0]["message"]["role"], "assistant");
        assert_eq!(out["choices"][0]["message"]["content"], content);
        assert_eq!(out["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn usage_is_reported_as_zero() {
        let resp: ChatResponse =
            serde_json::from_value(json!({ "message": { "content": "x" } })).unwrap();
        let out = serde_json::to_value(from_ollama(resp, meta())).unwrap();
        assert_eq!(
            out["usage"],
            json!({ "prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0 })
        );
    }

    // -----------------------------------------------------------------------
    // streaming
    // -----------------------------------------------------------------------

    fn chunk_line(content: &str, done: bool) -> Result<ChatChunk, ProxyError> {
        Ok(serde_json::from_value(json!({ "message": { "content": content }, "done": done })).unwrap())
    }

    async fn stream_payloads(items: Vec<Result<ChatChunk, ProxyError>>) -> Vec<String> {
        let lines: LineStream<ChatChunk> = Box::pin(futures_util::stream::iter(items));
        sse_stream(lines, ChatChunks::new(meta()))
            .map(|frame| {
                let text = String::from_utf8(frame.unwrap().to_vec()).unwrap();
                text.trim_start_matches("data: ").trim_end().to_string()
            })
            .collect()
            .await
    }

    #[tokio::test]
    async fn streamed_deltas_concatenate_to_full_content() {
        let payloads = stream_payloads(vec![
            chunk_line("The ", false),
            chunk_line("quick ", false),
            chunk_line("fox", false),
            chunk_line("", true),
        ])
        .await;

        let (sentinel, chunks) = payloads.split_last().unwrap();
        assert_eq!(sentinel, "[DONE]");

        let chunks: Vec<Value> = chunks.iter().map(|p| serde_json::from_str(p).unwrap()).collect();
        let text: String = chunks
            .iter()
            .filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
            .collect();
        assert_eq!(text, "The quick fox");

        for c in &chunks {
            assert_eq!(c["id"], "chatcmpl-test");
            assert_eq!(c["created"], 1_700_000_000);
            assert_eq!(c["object"], "chat.completion.chunk");
        }
    }

    #[tokio::test]
    async fn exactly_one_terminal_chunk_precedes_done() {
        let payloads = stream_payloads(vec![chunk_line("a", false), chunk_line("", true)]).await;
        let terminal: Value = serde_json::from_str(&payloads[payloads.len() - 2]).unwrap();
        assert_eq!(terminal["choices"][0]["delta"], json!({}));
        assert_eq!(terminal["choices"][0]["finish_reason"], "stop");

        let stops = payloads
            .iter()
            .filter(|p| p.contains("\"finish_reason\":\"stop\""))
            .count();
        assert_eq!(stops, 1);
        assert_eq!(payloads.iter().filter(|p| *p == "[DONE]").count(), 1);
    }
}
