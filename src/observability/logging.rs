//! # Logging
//!
//! Installs the global tracing subscriber.
//!
//! `RUST_LOG` wins when set; otherwise the configured `LOG_LEVEL` applies to
//! this crate and Kubernetes client chatter stays at `warn`.

use crate::config::{ControllerConfig, LogFormat};
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Build the filter from `RUST_LOG`, falling back to the configured level
#[must_use]
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(log_level))
}

fn default_filter(log_level: &str) -> EnvFilter {
    let level = normalize_level(log_level);
    EnvFilter::new(format!("config_distributor={level},kube=warn,warn"))
}

/// Map a `LOG_LEVEL` value onto a tracing level name; unknown values mean info
fn normalize_level(log_level: &str) -> &'static str {
    match log_level.trim().to_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}

/// Install the subscriber; fails if one is already installed
pub fn init_logging(config: &ControllerConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.log_level))
        .with_target(false);

    match config.log_format {
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {e}")),
        LogFormat::Text => builder
            .with_ansi(config.log_enable_color)
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {e}")),
    }
}
