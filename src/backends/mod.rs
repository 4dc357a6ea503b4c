//! HTTP client for the Ollama backend.
//!
//! A single [`BackendClient`] is built at startup and shared by every request.
//! [`reqwest::Client`] pools connections internally and is cheap to clone, so
//! the client carries no per-request state and needs no locking.
//!
//! Timeouts are applied per call rather than on the client:
//!
//! - buffered calls bound the whole exchange by the configured timeout;
//! - streamed calls bound only connect + response headers, so a long
//!   generation is never cut off mid-stream;
//! - the health probe always uses a fixed 5 s timeout.
//!
//! No call is ever retried.

pub mod ndjson;
pub mod ollama;

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::{config::Config, error::ProxyError};

use self::{
    ndjson::LineStream,
    ollama::{
        ChatChunk, ChatRequest, ChatResponse, GenerateChunk, GenerateRequest, GenerateResponse,
        TagsResponse, VersionResponse,
    },
};

/// Timeout for the `/api/version` health probe, independent of config.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client that talks to one Ollama server.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl BackendClient {
    /// Construct a client from the loaded config.
    ///
    /// # Errors
    /// Fails only if the TLS backend cannot be initialised.
    pub fn new(cfg: &Config) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ProxyError::BackendUnreachable(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.base_url().to_string(),
            timeout: cfg.timeout(),
        })
    }

    /// Base URL every endpoint path is appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /api/tags`: models installed on the backend.
    pub async fn list_models(&self) -> Result<TagsResponse, ProxyError> {
        let url = self.url("/api/tags");
        self.fetch_json(self.client.get(&url).timeout(self.timeout), &url).await
    }

    /// Buffered `POST /api/chat`.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProxyError> {
        self.post_json("/api/chat", request).await
    }

    /// Streamed `POST /api/chat`, one [`ChatChunk`] per backend line.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<LineStream<ChatChunk>, ProxyError> {
        let response = self.open_stream("/api/chat", request).await?;
        Ok(ndjson::from_response(response))
    }

    /// Buffered `POST /api/generate`.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProxyError> {
        self.post_json("/api/generate", request).await
    }

    /// Streamed `POST /api/generate`, one [`GenerateChunk`] per backend line.
    pub async fn generate_stream(
        &self,
        request: &GenerateRequest,
    ) -> Result<LineStream<GenerateChunk>, ProxyError> {
        let response = self.open_stream("/api/generate", request).await?;
        Ok(ndjson::from_response(response))
    }

    /// Probe `GET /api/version`. Any 2xx counts as healthy; the reported
    /// version is returned when the body carries one.
    pub async fn health_check(&self) -> Result<Option<String>, ProxyError> {
        let url = self.url("/api/version");
        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(ProxyError::from_transport)?;
        let response = ensure_success(response).await?;
        Ok(response.json::<VersionResponse>().await.ok().map(|v| v.version))
    }

    /// `true` when the backend answered the version probe with a 2xx.
    pub async fn is_healthy(&self) -> bool {
        self.health_check().await.is_ok()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ProxyError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let request = self.client.post(&url).json(body).timeout(self.timeout);
        self.fetch_json(request, &url).await
    }

    /// Send a buffered request and decode its JSON body.
    async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &str,
    ) -> Result<T, ProxyError> {
        let response = request.send().await.map_err(ProxyError::from_transport)?;
        let response = ensure_success(response).await?;
        let text = response.text().await.map_err(ProxyError::from_transport)?;

        debug!(%url, bytes = text.len(), "backend responded");

        serde_json::from_str(&text)
            .map_err(|e| ProxyError::Translation(format!("decoding {url} response: {e}")))
    }

    /// Send a streamed request, waiting at most `timeout` for the headers.
    async fn open_stream<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, ProxyError> {
        let url = self.url(path);
        let send = self.client.post(&url).json(body).send();

        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| ProxyError::BackendTimeout)?
            .map_err(ProxyError::from_transport)?;

        debug!(%url, "backend stream opened");
        ensure_success(response).await
    }
}

/// Turn a non-2xx response into [`ProxyError::BackendError`] carrying its body.
async fn ensure_success(response: Response) -> Result<Response, ProxyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProxyError::BackendError { status: status.as_u16(), body })
}
