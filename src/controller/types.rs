//! # Types
//!
//! Core types shared by the dispatcher and the watch runtime.

use std::fmt;
use thiserror::Error;

/// Kind of change reported for one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl ChangeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
        }
    }
}

/// Resource class served by one watch stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Rule,
    ConfigMap,
    Secret,
    Namespace,
}

impl ResourceClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceClass::Rule => "rule",
            ResourceClass::ConfigMap => "configmap",
            ResourceClass::Secret => "secret",
            ResourceClass::Namespace => "namespace",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine state, derived from the rule store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No rule stored; artifact and namespace events are no-ops
    NoRule,
    /// A rule is stored and drives replication
    RuleActive,
}

/// Fatal engine errors
#[derive(Debug, Error)]
pub enum DistributorError {
    #[error("{stream} watch failed ({reason}): {message}")]
    WatchFailed {
        stream: ResourceClass,
        reason: &'static str,
        message: String,
    },
    #[error("{stream} watch stream ended unexpectedly")]
    WatchEnded { stream: ResourceClass },
    #[error("{stream} watch task aborted: {message}")]
    TaskAborted {
        stream: ResourceClass,
        message: String,
    },
}

impl DistributorError {
    /// Stream that caused the failure
    #[must_use]
    pub fn stream(&self) -> ResourceClass {
        match self {
            DistributorError::WatchFailed { stream, .. }
            | DistributorError::WatchEnded { stream }
            | DistributorError::TaskAborted { stream, .. } => *stream,
        }
    }
}
