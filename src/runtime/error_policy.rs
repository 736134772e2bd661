//! # Error Policy
//!
//! Classification of watch stream errors. Every watch error is fatal for the
//! process; classification only decides which diagnostics are logged before
//! the controller exits and gets restarted by its supervisor.

use crate::controller::types::{DistributorError, ResourceClass};
use tracing::{error, warn};

/// Coarse class of a watch stream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// 401: token expired or revoked
    Unauthorized,
    /// 403: RBAC does not allow list/watch
    Forbidden,
    /// 410: resource version expired
    Expired,
    /// 429: API server throttling or storage reinitializing
    Throttled,
    /// 404: resource type unknown, usually a missing CRD
    NotFound,
    Other,
}

impl WatchErrorClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WatchErrorClass::Unauthorized => "unauthorized",
            WatchErrorClass::Forbidden => "forbidden",
            WatchErrorClass::Expired => "expired",
            WatchErrorClass::Throttled => "throttled",
            WatchErrorClass::NotFound => "not-found",
            WatchErrorClass::Other => "other",
        }
    }
}

/// Classify a watch error from its rendered message
///
/// 404 is checked before 401: a plain-text 404 body surfaces as a decode
/// error whose chain may mention other status words.
#[must_use]
pub fn classify_watch_error(message: &str) -> WatchErrorClass {
    let is_not_found = message.contains("ObjectNotFound")
        || message.contains("404")
        || message.contains("not found");
    if is_not_found {
        return WatchErrorClass::NotFound;
    }

    if message.contains("401") || message.contains("Unauthorized") {
        WatchErrorClass::Unauthorized
    } else if message.contains("403")
        || message.contains("Forbidden")
        || message.contains("forbidden")
    {
        WatchErrorClass::Forbidden
    } else if message.contains("410")
        || message.contains("too old resource version")
        || message.contains("Expired")
        || message.contains("Gone")
    {
        WatchErrorClass::Expired
    } else if message.contains("429")
        || message.contains("storage is (re)initializing")
        || message.contains("TooManyRequests")
    {
        WatchErrorClass::Throttled
    } else {
        WatchErrorClass::Other
    }
}

/// Log diagnostics for a failed stream and build the fatal error
pub fn watch_failure(stream: ResourceClass, message: &str) -> DistributorError {
    let class = classify_watch_error(message);
    let resource = resource_plural(stream);

    match class {
        WatchErrorClass::Unauthorized | WatchErrorClass::Forbidden => {
            error!(
                stream = stream.as_str(),
                error_type = class.as_str(),
                error = message,
                "watch.error.access_denied"
            );
            error!("Diagnostics:");
            error!("   1. Verify the ServiceAccount may list and watch {resource}:");
            error!(
                "      kubectl auth can-i watch {resource} --all-namespaces --as=system:serviceaccount:<namespace>:<serviceaccount>"
            );
            error!("   2. Verify the ClusterRoleBinding still references the ServiceAccount");
            error!("   3. If RBAC was changed recently, the restarted pod picks it up");
        }
        WatchErrorClass::NotFound if stream == ResourceClass::Rule => {
            error!(
                stream = stream.as_str(),
                error_type = class.as_str(),
                error = message,
                "watch.error.crd_missing"
            );
            error!("Diagnostics:");
            error!("   The ConfigurationDistributionRule CRD is probably not installed:");
            error!("      crdgen | kubectl apply -f -");
        }
        WatchErrorClass::Expired | WatchErrorClass::Throttled => {
            warn!(
                stream = stream.as_str(),
                error_type = class.as_str(),
                error = message,
                "watch.error.transient"
            );
        }
        WatchErrorClass::NotFound | WatchErrorClass::Other => {
            error!(
                stream = stream.as_str(),
                error_type = class.as_str(),
                error = message,
                "watch.error"
            );
        }
    }

    DistributorError::WatchFailed {
        stream,
        reason: class.as_str(),
        message: message.to_string(),
    }
}

fn resource_plural(stream: ResourceClass) -> &'static str {
    match stream {
        ResourceClass::Rule => "configurationdistributionrules",
        ResourceClass::ConfigMap => "configmaps",
        ResourceClass::Secret => "secrets",
        ResourceClass::Namespace => "namespaces",
    }
}
