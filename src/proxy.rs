//! Request orchestration: validate, translate, call Ollama, translate back.
//!
//! Handlers in [`crate::api`] only deal with HTTP concerns; every operation
//! here takes a decoded request and returns either a typed OpenAI response or
//! a ready-to-send [`SseStream`]. Validation always runs before the backend is
//! contacted, and no operation retries.

use std::{sync::Arc, time::Instant};

use tracing::{debug, info};

use crate::{
    backends::BackendClient,
    config::Config,
    error::ProxyError,
    openai::{ChatCompletion, ChatCompletionRequest, CompletionRequest, ModelList, TextCompletion},
    translate::{
        self,
        chat::ChatChunks,
        completions::TextChunks,
        stream::{sse_stream, SseStream},
        ResponseMeta,
    },
};

/// Shared application state injected into every handler via [`axum::extract::State`].
///
/// Read-only after construction; cloning the `Arc` around it is the only
/// sharing that happens between requests.
pub struct ProxyState {
    /// Immutable process-wide config.
    pub config: Arc<Config>,
    /// Pooled client for the Ollama backend.
    pub backend: BackendClient,
    /// Process start time; uptime is logged at debug by the health reporter.
    pub started_at: Instant,
}

impl ProxyState {
    pub fn new(config: Arc<Config>) -> Result<Self, ProxyError> {
        let backend = BackendClient::new(&config)?;
        Ok(Self { config, backend, started_at: Instant::now() })
    }
}

/// `GET /v1/models`.
#[tracing::instrument(skip(state))]
pub async fn list_models(state: &ProxyState) -> Result<ModelList, ProxyError> {
    let tags = state.backend.list_models().await?;
    debug!(count = tags.models.len(), "listed backend models");
    Ok(translate::models::to_openai(tags, translate::unix_now()))
}

/// Buffered chat completion.
#[tracing::instrument(skip(state, request), fields(model = %request.model, messages = request.messages.len()))]
pub async fn chat(
    state: &ProxyState,
    request: ChatCompletionRequest,
) -> Result<ChatCompletion, ProxyError> {
    request.validate()?;
    let body = translate::chat::to_ollama(&request);

    let t0 = Instant::now();
    let response = state.backend.chat(&body).await?;
    info!(latency_ms = t0.elapsed().as_millis() as u64, "chat completed");

    Ok(translate::chat::from_ollama(response, ResponseMeta::chat(&request.model)))
}

/// Streamed chat completion. The backend stream is opened before returning,
/// so connect failures still surface as ordinary HTTP errors.
#[tracing::instrument(skip(state, request), fields(model = %request.model, messages = request.messages.len()))]
pub async fn chat_stream(
    state: &ProxyState,
    request: ChatCompletionRequest,
) -> Result<SseStream, ProxyError> {
    request.validate()?;
    let body = translate::chat::to_ollama(&request);

    let lines = state.backend.chat_stream(&body).await?;
    let meta = ResponseMeta::chat(&request.model);
    info!(id = %meta.id, "chat stream opened");

    Ok(sse_stream(lines, ChatChunks::new(meta)))
}

/// Buffered text completion.
#[tracing::instrument(skip(state, request), fields(model = %request.model))]
pub async fn complete(
    state: &ProxyState,
    request: CompletionRequest,
) -> Result<TextCompletion, ProxyError> {
    request.validate()?;
    let body = translate::completions::to_ollama(&request);

    let t0 = Instant::now();
    let response = state.backend.generate(&body).await?;
    info!(latency_ms = t0.elapsed().as_millis() as u64, "completion finished");

    Ok(translate::completions::from_ollama(response, ResponseMeta::completion(&request.model)))
}

/// Streamed text completion.
#[tracing::instrument(skip(state, request), fields(model = %request.model))]
pub async fn complete_stream(
    state: &ProxyState,
    request: CompletionRequest,
) -> Result<SseStream, ProxyError> {
    request.validate()?;
    let body = translate::completions::to_ollama(&request);

    let lines = state.backend.generate_stream(&body).await?;
    let meta = ResponseMeta::completion(&request.model);
    info!(id = %meta.id, "completion stream opened");

    Ok(sse_stream(lines, TextChunks::new(meta)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt as _;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_for(base_url: &str) -> ProxyState {
        let config = Config { ollama_base_url: base_url.into(), timeout: 5.0, ..Config::default() };
        ProxyState::new(Arc::new(config)).unwrap()
    }

    fn chat_request(body: serde_json::Value) -> ChatCompletionRequest {
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_backend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let state = state_for(&server.uri());
        let req = chat_request(json!({ "model": "llama3", "messages": [] }));
        assert!(matches!(chat(&state, req.clone()).await, Err(ProxyError::Validation(_))));
        assert!(matches!(chat_stream(&state, req).await, Err(ProxyError::Validation(_))));

        let completion: CompletionRequest =
            serde_json::from_value(json!({ "model": "llama3", "prompt": "" })).unwrap();
        assert!(complete(&state, completion).await.is_err());
    }

    #[tokio::test]
    async fn chat_reports_requested_model_and_backend_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3:latest",
                "message": { "role": "assistant", "content": "pong" },
                "done": true,
            })))
            .mount(&server)
            .await;

        let req = chat_request(json!({
            "model": "llama3",
            "messages": [{ "role": "user", "content": "ping" }],
        }));
        let resp = chat(&state_for(&server.uri()), req).await.unwrap();
        assert_eq!(resp.model, "llama3");
        assert_eq!(resp.choices[0].message.content, "pong");
        assert!(resp.id.starts_with("chatcmpl-"));
    }

    #[tokio::test]
    async fn completion_stream_ends_with_terminal_chunk_and_done() {
        let server = MockServer::start().await;
        let body = "{\"response\":\"Once\",\"done\":false}\n\
                    {\"response\":\" upon\",\"done\":false}\n\
                    {\"response\":\"\",\"done\":true}\n";
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let req: CompletionRequest = serde_json::from_value(json!({
            "model": "llama3",
            "prompt": "Tell me a story",
            "stream": true,
        }))
        .unwrap();
        let frames: Vec<String> = complete_stream(&state_for(&server.uri()), req)
            .await
            .unwrap()
            .map(|f| String::from_utf8(f.unwrap().to_vec()).unwrap())
            .collect()
            .await;

        assert_eq!(frames.len(), 4);
        assert!(frames[0].contains("\"text\":\"Once\""));
        assert!(frames[2].contains("\"finish_reason\":\"stop\""));
        assert_eq!(frames[3], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn list_models_translates_tags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "models": [{ "name": "llama3" }] })),
            )
            .mount(&server)
            .await;

        let list = list_models(&state_for(&server.uri())).await.unwrap();
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.data[0].id, "llama3");
    }
}
