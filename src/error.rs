//! Unified error type for the proxy.
//!
//! [`ProxyError`] is returned by the backend client, the schema translator and
//! the request validators alike, and converts into an HTTP response via
//! [`IntoResponse`]. Every handler returns `Result<T, ProxyError>` and
//! propagates with `?`; no failure escapes the request that caused it.
//!
//! | Variant | Status |
//! |---|---|
//! | [`Validation`](ProxyError::Validation) | 400 |
//! | [`BackendTimeout`](ProxyError::BackendTimeout) | 504 |
//! | [`BackendUnreachable`](ProxyError::BackendUnreachable) | 502 |
//! | [`BackendError`](ProxyError::BackendError) | 502 |
//! | [`Translation`](ProxyError::Translation) | 500 |

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// Everything that can go wrong while serving one request.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The inbound request is malformed or missing required fields.
    #[error("{0}")]
    Validation(String),

    /// Ollama did not answer within the configured timeout.
    #[error("Ollama request timeout")]
    BackendTimeout,

    /// Ollama could not be reached at the connection level.
    #[error("Ollama request failed: {0}")]
    BackendUnreachable(String),

    /// Ollama answered with a non-2xx status.
    #[error("Ollama returned HTTP {status}: {body}")]
    BackendError { status: u16, body: String },

    /// Ollama answered with a shape we could not map.
    #[error("unexpected Ollama response: {0}")]
    Translation(String),
}

impl ProxyError {
    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::BackendTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::BackendUnreachable(_) | Self::BackendError { .. } => StatusCode::BAD_GATEWAY,
            Self::Translation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_request_error",
            Self::BackendTimeout => "backend_timeout",
            Self::BackendUnreachable(_) => "backend_unreachable",
            Self::BackendError { .. } => "backend_error",
            Self::Translation(_) => "translation_error",
        }
    }

    /// JSON error body, shared by HTTP error responses and in-band stream frames.
    pub fn to_body(&self) -> Value {
        let mut error = json!({
            "message": self.to_string(),
            "type": self.kind(),
        });
        if let Self::BackendError { status, .. } = self {
            error["backend_status"] = json!(status);
        }
        json!({ "error": error })
    }

    /// Classify a [`reqwest::Error`] raised while talking to Ollama.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::BackendTimeout
        } else if err.is_decode() {
            Self::Translation(err.to_string())
        } else {
            Self::BackendUnreachable(err.to_string())
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(error = %self, status = status.as_u16(), "request failed");
        (status, Json(self.to_body())).into_response()
    }
}

/// A body that axum could not decode into the request type is a client error.
impl From<JsonRejection> for ProxyError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}
