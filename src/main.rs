use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{
    fmt, layer::SubscriberExt as _, reload, util::SubscriberInitExt as _, EnvFilter, Layer as _,
    Registry,
};

mod api;
mod backends;
mod config;
mod error;
mod openai;
mod proxy;
mod translate;

use config::Config;

/// Filter used when neither `RUST_LOG` nor `log_level` is set.
const DEFAULT_LOG_FILTER: &str = "ollama_openai_proxy=info,tower_http=warn";

/// `OLLAMA_PROXY_LOG_FORMAT=json` switches to one JSON object per log line.
const LOG_FORMAT_ENV: &str = "OLLAMA_PROXY_LOG_FORMAT";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Container HEALTHCHECK: query our own /health and exit without serving.
    if std::env::args().nth(1).as_deref() == Some("--healthcheck") {
        return healthcheck().await;
    }

    // Tracing first, so config fallbacks are logged; `log_level` is applied once known.
    let filter_handle = init_tracing();
    let config = Config::from_env();
    if let Some(handle) = filter_handle {
        apply_log_level(&handle, config.log_level.as_deref());
    }

    info!(
        host = %config.host,
        port = config.port,
        backend = %config.base_url(),
        timeout_secs = config.timeout,
        "ollama-openai-proxy starting"
    );

    let config = Arc::new(config);
    let state = Arc::new(proxy::ProxyState::new(Arc::clone(&config)).context("building backend client")?);

    if !state.backend.is_healthy().await {
        warn!(backend = %state.config.base_url(), "Ollama is not reachable yet; requests will fail until it is");
    }

    let trace_layer = tower_http::trace::TraceLayer::new_for_http()
        .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
        .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO));

    let app = api::openai::router(Arc::clone(&state))
        .layer(axum::middleware::from_fn(api::request_id::request_id_middleware))
        .layer(trace_layer)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("binding {}:{}", config.host, config.port))?;
    info!(addr = %listener.local_addr()?, "OpenAI-compatible API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("shut down cleanly");
    Ok(())
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Install the global subscriber. `RUST_LOG` wins and is final; otherwise
/// [`DEFAULT_LOG_FILTER`] is used and a handle is returned so the config's
/// `log_level` can replace it later.
fn init_tracing() -> Option<FilterHandle> {
    let from_env = EnvFilter::try_from_default_env().ok();
    let pinned = from_env.is_some();
    let (filter, handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER)));

    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let output = if json { fmt::layer().json().boxed() } else { fmt::layer().boxed() };

    tracing_subscriber::registry().with(filter).with(output).init();
    (!pinned).then_some(handle)
}

/// Parse a `log_level` directive; `None` when absent or invalid.
fn log_level_filter(log_level: Option<&str>) -> Option<EnvFilter> {
    let level = log_level?.trim();
    if level.is_empty() {
        return None;
    }
    match EnvFilter::try_new(level) {
        Ok(filter) => Some(filter),
        Err(e) => {
            warn!(value = %level, error = %e, "ignoring invalid log_level");
            None
        }
    }
}

fn apply_log_level(handle: &FilterHandle, log_level: Option<&str>) {
    if let Some(filter) = log_level_filter(log_level) {
        if let Err(e) = handle.reload(filter) {
            warn!(error = %e, "could not apply log_level");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}

/// Lightweight healthcheck: GET /health on the configured port and exit 0
/// when it reports `"healthy"`, 1 otherwise.
async fn healthcheck() -> anyhow::Result<()> {
    let port = Config::from_env().port;
    let url = format!("http://127.0.0.1:{port}/health");

    let healthy = async {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        let body: serde_json::Value = client.get(&url).send().await?.error_for_status()?.json().await?;
        anyhow::Ok(body["status"] == "healthy")
    }
    .await
    .unwrap_or(false);

    std::process::exit(if healthy { 0 } else { 1 });
}
