//! Health reporter (`GET /health`, `GET /`).
//!
//! Always answers 200; backend reachability is reported in the body so simple
//! monitors only need to look at one field.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use tracing::{debug, warn};

use crate::proxy::ProxyState;

/// Body of the health endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum HealthReport {
    Healthy {
        status: &'static str,
        backend: &'static str,
        api: &'static str,
    },
    Unhealthy {
        status: &'static str,
        backend: &'static str,
        error: String,
    },
}

impl HealthReport {
    pub fn healthy() -> Self {
        Self::Healthy { status: "healthy", backend: "connected", api: "openai-compatible" }
    }

    pub fn unhealthy(error: String) -> Self {
        Self::Unhealthy { status: "unhealthy", backend: "disconnected", error }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

/// Probe the backend and build a [`HealthReport`]. Never fails.
pub async fn check(state: &ProxyState) -> HealthReport {
    match state.backend.health_check().await {
        Ok(version) => {
            debug!(
                version = version.as_deref().unwrap_or("unknown"),
                uptime_secs = state.started_at.elapsed().as_secs(),
                "backend healthy"
            );
            HealthReport::healthy()
        }
        Err(e) => HealthReport::unhealthy(e.to_string()),
    }
}

/// `GET /health`: backend reachability, always HTTP 200.
pub async fn health(State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    let report = check(&state).await;
    if !report.is_healthy() {
        warn!(backend = %state.backend.base_url(), "health check: Ollama unreachable");
    }
    Json(report)
}
