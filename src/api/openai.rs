//! OpenAI-compatible API: the endpoints clients talk to.
//!
//! This is intentionally a thin layer: validation, translation and backend
//! calls live in [`crate::proxy`]. Handlers decode the body, pick buffered or
//! streamed dispatch from the request's `stream` flag, and serialise the
//! result as JSON or as a `text/event-stream` body.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::{
    error::ProxyError,
    openai::{ChatCompletionRequest, CompletionRequest},
    proxy::{self, ProxyState},
    translate::stream::SseStream,
};

/// Build the client-facing axum router. Every route is mounted twice, with
/// and without the `/v1` prefix.
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/", get(crate::api::health::health))
        .route("/health", get(crate::api::health::health))
        .route("/v1/models", get(list_models))
        .route("/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/chat/completions", post(chat_completions))
        .route("/v1/completions", post(completions))
        .route("/completions", post(completions))
        .with_state(state)
}

/// `GET /v1/models`: models installed on the Ollama server.
pub async fn list_models(State(state): State<Arc<ProxyState>>) -> Result<Response, ProxyError> {
    let models = proxy::list_models(&state).await?;
    Ok(Json(models).into_response())
}

/// `POST /v1/chat/completions`: buffered JSON, or SSE when `stream` is set.
pub async fn chat_completions(
    State(state): State<Arc<ProxyState>>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, ProxyError> {
    let Json(request) = payload?;
    if request.stream {
        let frames = proxy::chat_stream(&state, request).await?;
        Ok(event_stream(frames))
    } else {
        let completion = proxy::chat(&state, request).await?;
        Ok(Json(completion).into_response())
    }
}

/// `POST /v1/completions`: buffered JSON, or SSE when `stream` is set.
pub async fn completions(
    State(state): State<Arc<ProxyState>>,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<Response, ProxyError> {
    let Json(request) = payload?;
    if request.stream {
        let frames = proxy::complete_stream(&state, request).await?;
        Ok(event_stream(frames))
    } else {
        let completion = proxy::complete(&state, request).await?;
        Ok(Json(completion).into_response())
    }
}

/// Wrap pre-framed SSE bytes in a streaming response. Each frame is written to
/// the socket as its own body chunk.
fn event_stream(frames: SseStream) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}
