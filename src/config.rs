//! Configuration for ollama-openai-proxy.
//!
//! Config is loaded once at startup from a JSON file, then environment
//! overrides are applied on top. Unlike a gateway with routing tables, nothing
//! here is worth refusing to start over: a missing or malformed file falls back
//! to built-in defaults, and individual bad values fall back to their default
//! with a warning.
//!
//! # Example
//! ```json
//! {
//!   "port": 8000,
//!   "ollama_base_url": "http://localhost:11434",
//!   "timeout": 60.0
//! }
//! ```
//!
//! The resulting [`Config`] is wrapped in an `Arc` and handed to the HTTP
//! surface and the backend client explicitly; it is never mutated afterwards.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Environment variable naming the config file path.
pub const CONFIG_PATH_ENV: &str = "OLLAMA_PROXY_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Top-level proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    /// Interface the HTTP surface binds to (default: `127.0.0.1`).
    #[serde(default = "defaults::host")]
    pub host: String,

    /// Port the HTTP surface listens on (default: 8000).
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Base URL of the Ollama server, without a trailing `/api`.
    #[serde(default = "defaults::ollama_base_url")]
    pub ollama_base_url: String,

    /// Backend request timeout in seconds (default: 60).
    ///
    /// Bounds a whole buffered call, but only the connect + response-header
    /// phase of a streamed one.
    #[serde(default = "defaults::timeout")]
    pub timeout: f64,

    /// Tracing filter directive (also controlled by `RUST_LOG`).
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
            ollama_base_url: defaults::ollama_base_url(),
            timeout: defaults::timeout(),
            log_level: None,
        }
    }
}

impl Config {
    /// Strictly load and sanitise a config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a JSON object
    /// matching [`Config`].
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&content).context("parsing config JSON")?;
        config.sanitize();
        Ok(config)
    }

    /// Load a config file, falling back to defaults on any failure.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "no config file: using defaults");
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config unusable: using defaults");
                Self::default()
            }
        }
    }

    /// Resolve the config path from the environment, load it, and apply
    /// environment overrides. Never fails.
    pub fn from_env() -> Self {
        let mut config = Self::load_or_default(&config_path());
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply `OLLAMA_*` overrides using `lookup` to read variables.
    ///
    /// Taking the lookup as a closure keeps this testable without mutating the
    /// process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("OLLAMA_BASE_URL").filter(|v| !v.is_empty()) {
            if is_valid_base_url(&url) {
                self.ollama_base_url = url;
            } else {
                warn!(value = %url, "ignoring invalid OLLAMA_BASE_URL");
            }
        }

        if let Some(raw) = lookup("OLLAMA_PROXY_TIMEOUT") {
            match raw.parse::<f64>() {
                Ok(secs) if is_valid_timeout(secs) => self.timeout = secs,
                _ => warn!(value = %raw, "ignoring invalid OLLAMA_PROXY_TIMEOUT"),
            }
        }

        if let Some(host) = lookup("OLLAMA_PROXY_HOST").filter(|v| !v.is_empty()) {
            self.host = host;
        }

        if let Some(raw) = lookup("OLLAMA_PROXY_PORT") {
            match raw.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => warn!(value = %raw, "ignoring invalid OLLAMA_PROXY_PORT"),
            }
        }
    }

    /// Backend timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| Duration::from_secs_f64(defaults::timeout()))
    }

    /// Backend base URL with any trailing `/` removed.
    pub fn base_url(&self) -> &str {
        self.ollama_base_url.trim_end_matches('/')
    }

    /// Replace values that would break the proxy at runtime with their defaults.
    fn sanitize(&mut self) {
        if !is_valid_base_url(&self.ollama_base_url) {
            warn!(value = %self.ollama_base_url, "invalid ollama_base_url: using default");
            self.ollama_base_url = defaults::ollama_base_url();
        }
        if !is_valid_timeout(self.timeout) {
            warn!(value = self.timeout, "invalid timeout: using default");
            self.timeout = defaults::timeout();
        }
    }
}

/// Path of the config file: `$OLLAMA_PROXY_CONFIG`, else `./config.json`.
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn is_valid_base_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}

/// Positive and representable as a [`Duration`].
fn is_valid_timeout(secs: f64) -> bool {
    Duration::try_from_secs_f64(secs).is_ok_and(|d| !d.is_zero())
}

mod defaults {
    pub fn host() -> String { "127.0.0.1".into() }
    pub fn port() -> u16 { 8000 }
    pub fn ollama_base_url() -> String { "http://localhost:11434".into() }
    pub fn timeout() -> f64 { 60.0 }
}
