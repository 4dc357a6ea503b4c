//! Request correlation for the proxy.
//!
//! Each inbound request carries an `X-Request-ID`, taken from the caller when
//! present and non-empty or generated as a UUID v4 otherwise. The ID is
//! available to handlers as an axum `Extension`, wraps the handler in a
//! `request` span, and is echoed back on the response.
//!
//! Streamed bodies outlive the handler, so log lines emitted while SSE frames
//! are being produced are not inside this span.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument as _;
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// ID assigned to the current request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    fn from_request(req: &Request) -> Self {
        let id = req
            .headers()
            .get(&REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self(id)
    }
}

/// Must sit inside `TraceLayer` so the `request` span nests under the HTTP span.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = RequestId::from_request(&req);
    req.extensions_mut().insert(id.clone());

    let span = tracing::info_span!("request", id = %id.0, path = %req.uri().path());
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id.0) {
        response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}
