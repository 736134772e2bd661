//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_LOG_LEVEL, DEFAULT_REPLICATION_CONCURRENCY, DEFAULT_RESYNC_INTERVAL_SECS,
    DEFAULT_RULE_NAME, DEFAULT_RULE_NAMESPACE,
};
use crate::crd::RuleRef;
use std::str::FromStr;
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// The configuration is read once at startup; the pinned rule identity never
/// changes for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace of the distribution rule, also the home namespace of all sources
    pub rule_namespace: String,
    /// Name of the distribution rule this instance is pinned to
    pub rule_name: String,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: LogFormat,
    /// Enable color in text format logs
    pub log_enable_color: bool,
    /// Maximum target namespaces written concurrently for one artifact
    pub replication_concurrency: usize,
    /// Pause between periodic full resync passes (zero disables them)
    pub resync_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            rule_namespace: DEFAULT_RULE_NAMESPACE.to_string(),
            rule_name: DEFAULT_RULE_NAME.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::Text,
            log_enable_color: false,
            replication_concurrency: DEFAULT_REPLICATION_CONCURRENCY,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// `RULE_NAMESPACE`/`RULE_NAME` win over the legacy `NAMESPACE`/`RULENAME`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            rule_namespace: non_empty("RULE_NAMESPACE")
                .or_else(|| non_empty("NAMESPACE"))
                .unwrap_or_else(|| DEFAULT_RULE_NAMESPACE.to_string()),
            rule_name: non_empty("RULE_NAME")
                .or_else(|| non_empty("RULENAME"))
                .unwrap_or_else(|| DEFAULT_RULE_NAME.to_string()),
            log_level: non_empty("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format: non_empty("LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(LogFormat::Text),
            log_enable_color: non_empty("LOG_ENABLE_COLOR").is_some_and(|v| parse_bool(&v)),
            replication_concurrency: non_empty("REPLICATION_CONCURRENCY")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(DEFAULT_REPLICATION_CONCURRENCY)
                .max(1),
            resync_interval: non_empty("RESYNC_INTERVAL")
                .and_then(|v| parse_seconds(&v))
                .unwrap_or(Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS)),
        }
    }

    /// Identity of the rule this controller instance is pinned to
    #[must_use]
    pub fn rule_ref(&self) -> RuleRef {
        RuleRef::new(&self.rule_namespace, &self.rule_name)
    }
}

/// Whole seconds, optionally suffixed with `s`
fn parse_seconds(value: &str) -> Option<Duration> {
    let value = value.trim();
    let digits = value.strip_suffix('s').unwrap_or(value);
    digits.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Interpret common truthy spellings
fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
