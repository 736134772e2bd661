//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Label on a source artifact that is compared against the rule selector
pub const SELECTOR_LABEL_KEY: &str = "rule";

/// Annotation written by `kubectl apply`; never copied onto replicas
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Default namespace holding the distribution rule
pub const DEFAULT_RULE_NAMESPACE: &str = "default";

/// Default name of the distribution rule
pub const DEFAULT_RULE_NAME: &str = "default-rule";

/// Default number of target namespaces written concurrently per artifact
pub const DEFAULT_REPLICATION_CONCURRENCY: usize = 8;

/// Default seconds between periodic resync passes; `0` disables them
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 30;

/// Default tracing filter when neither `RUST_LOG` nor `LOG_LEVEL` narrows it
pub const DEFAULT_LOG_LEVEL: &str = "INFO";
