//! # Dispatcher
//!
//! Routes one change notification at a time to the rule store, the matcher,
//! the replicator or a resync pass.
//!
//! Each watch stream calls [`Distributor::dispatch`] sequentially for its own
//! events; the four streams call it concurrently with each other. The rule
//! store is the only state they share.

use crate::controller::artifact::Artifact;
use crate::controller::client::{ArtifactClient, RuleClient};
use crate::controller::matcher::{explain, MatchOutcome};
use crate::controller::replicator::{ReplicationReport, Replicator};
use crate::controller::resync::{Resync, ResyncReport};
use crate::controller::rule_store::RuleStore;
use crate::controller::types::{ChangeType, EngineState, ResourceClass};
use crate::crd::{ConfigurationDistributionRule, RuleRef};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One change notification, tagged by resource class
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    Rule(ChangeType, ConfigurationDistributionRule),
    ConfigMap(ChangeType, ConfigMap),
    Secret(ChangeType, Secret),
    /// Namespaces are only names
    Namespace(ChangeType, String),
}

impl DispatchEvent {
    #[must_use]
    pub fn class(&self) -> ResourceClass {
        match self {
            DispatchEvent::Rule(..) => ResourceClass::Rule,
            DispatchEvent::ConfigMap(..) => ResourceClass::ConfigMap,
            DispatchEvent::Secret(..) => ResourceClass::Secret,
            DispatchEvent::Namespace(..) => ResourceClass::Namespace,
        }
    }

    #[must_use]
    pub fn change(&self) -> ChangeType {
        match self {
            DispatchEvent::Rule(change, _)
            | DispatchEvent::ConfigMap(change, _)
            | DispatchEvent::Secret(change, _)
            | DispatchEvent::Namespace(change, _) => *change,
        }
    }
}

/// Why an event caused no work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Rule event for another rule identity
    ForeignRule,
    /// Replayed rule notification with an unchanged version token
    UnchangedVersion,
    /// No rule is active
    NoRule,
    /// Artifact deletions are never retracted
    ArtifactDeleted,
    /// The artifact failed the matcher
    NotMatched(MatchOutcome),
    /// Namespace already known (modified or deleted)
    NamespaceNotNew,
    /// Namespace is not a target of the current rule
    NotATarget,
}

impl IgnoreReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IgnoreReason::ForeignRule => "foreign-rule",
            IgnoreReason::UnchangedVersion => "unchanged-version",
            IgnoreReason::NoRule => "no-rule",
            IgnoreReason::ArtifactDeleted => "artifact-deleted",
            IgnoreReason::NotMatched(outcome) => outcome.as_str(),
            IgnoreReason::NamespaceNotNew => "namespace-not-new",
            IgnoreReason::NotATarget => "not-a-target",
        }
    }
}

/// What handling one event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Ignored(IgnoreReason),
    /// Rule stored and a full resync ran against it
    RuleApplied(ResyncReport),
    RuleCleared,
    Replicated(ReplicationReport),
    CaughtUp {
        namespace: String,
        report: ResyncReport,
    },
}

/// The reconciliation core: rule store plus the replication paths
pub struct Distributor {
    rule_ref: RuleRef,
    rules: RuleStore,
    replicator: Replicator,
    resync: Resync,
}

impl std::fmt::Debug for Distributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distributor")
            .field("rule_ref", &self.rule_ref)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Distributor {
    /// Create a distributor pinned to `rule_ref`, starting in `NoRule`
    #[must_use]
    pub fn new(
        rule_ref: RuleRef,
        client: Arc<dyn ArtifactClient>,
        replication_concurrency: usize,
    ) -> Self {
        let replicator = Replicator::new(Arc::clone(&client), replication_concurrency);
        let resync = Resync::new(client, replicator.clone());
        Self {
            rule_ref,
            rules: RuleStore::new(),
            replicator,
            resync,
        }
    }

    /// Interrupt resync passes between artifacts once `shutdown` is cancelled
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.resync = self.resync.with_shutdown(shutdown);
        self
    }

    #[must_use]
    pub fn rule_ref(&self) -> &RuleRef {
        &self.rule_ref
    }

    #[must_use]
    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        if self.rules.is_active() {
            EngineState::RuleActive
        } else {
            EngineState::NoRule
        }
    }

    /// Fetch the pinned rule once at startup
    ///
    /// A found rule is handled like an `Added` event. A missing rule or a
    /// failed fetch leaves the engine in `NoRule`; the rule watch delivers it later.
    pub async fn bootstrap(&self, rules: &dyn RuleClient) -> DispatchOutcome {
        match rules.get(&self.rule_ref).await {
            Ok(Some(rule)) => {
                info!(rule = %self.rule_ref, "rule.bootstrap.found");
                self.dispatch(DispatchEvent::Rule(ChangeType::Added, rule))
                    .await
            }
            Ok(None) => {
                info!(rule = %self.rule_ref, "rule.bootstrap.missing");
                DispatchOutcome::Ignored(IgnoreReason::NoRule)
            }
            Err(e) => {
                warn!(
                    rule = %self.rule_ref,
                    error = %e,
                    "rule.bootstrap.failed, waiting for the rule watch"
                );
                DispatchOutcome::Ignored(IgnoreReason::NoRule)
            }
        }
    }

    /// Re-run the full resync against the current rule snapshot
    ///
    /// Returns `None` when no rule is active.
    pub async fn resync_current(&self) -> Option<ResyncReport> {
        let rule = self.rules.get()?;
        Some(self.resync.periodic(&rule).await)
    }

    /// Handle one event to completion
    pub async fn dispatch(&self, event: DispatchEvent) -> DispatchOutcome {
        let class = event.class();
        let change = event.change();

        let outcome = match event {
            DispatchEvent::Rule(change, rule) => self.on_rule(change, rule).await,
            DispatchEvent::ConfigMap(change, cm) => {
                self.on_artifact(change, Artifact::ConfigMap(cm)).await
            }
            DispatchEvent::Secret(change, secret) => {
                self.on_artifact(change, Artifact::Secret(secret)).await
            }
            DispatchEvent::Namespace(change, namespace) => {
                self.on_namespace(change, &namespace).await
            }
        };

        if let DispatchOutcome::Ignored(reason) = &outcome {
            debug!(
                stream = class.as_str(),
                change = change.as_str(),
                reason = reason.as_str(),
                "dispatch.ignored"
            );
        }

        outcome
    }

    async fn on_rule(
        &self,
        change: ChangeType,
        rule: ConfigurationDistributionRule,
    ) -> DispatchOutcome {
        if !self.rule_ref.identifies(&rule) {
            return DispatchOutcome::Ignored(IgnoreReason::ForeignRule);
        }

        match change {
            ChangeType::Deleted => {
                self.rules.set(None);
                DispatchOutcome::RuleCleared
            }
            ChangeType::Added | ChangeType::Modified => {
                if self.is_replay(&rule) {
                    return DispatchOutcome::Ignored(IgnoreReason::UnchangedVersion);
                }

                self.rules.set(Some(rule.clone()));
                info!(
                    rule = %self.rule_ref,
                    change = change.as_str(),
                    "rule.resync.triggered"
                );
                DispatchOutcome::RuleApplied(self.resync.full(&rule).await)
            }
        }
    }

    /// A notification carrying the version token already stored
    fn is_replay(&self, rule: &ConfigurationDistributionRule) -> bool {
        match (self.rules.get(), rule.version()) {
            (Some(current), Some(version)) => current.version() == Some(version),
            _ => false,
        }
    }

    async fn on_artifact(&self, change: ChangeType, artifact: Artifact) -> DispatchOutcome {
        let Some(rule) = self.rules.get() else {
            return DispatchOutcome::Ignored(IgnoreReason::NoRule);
        };

        if change == ChangeType::Deleted {
            return DispatchOutcome::Ignored(IgnoreReason::ArtifactDeleted);
        }

        match explain(&artifact, &rule) {
            MatchOutcome::Matched => {
                let targets = rule.targets();
                DispatchOutcome::Replicated(self.replicator.apply(&artifact, &targets).await)
            }
            outcome => DispatchOutcome::Ignored(IgnoreReason::NotMatched(outcome)),
        }
    }

    async fn on_namespace(&self, change: ChangeType, namespace: &str) -> DispatchOutcome {
        let Some(rule) = self.rules.get() else {
            return DispatchOutcome::Ignored(IgnoreReason::NoRule);
        };

        if change != ChangeType::Added {
            return DispatchOutcome::Ignored(IgnoreReason::NamespaceNotNew);
        }

        if !rule.targets_namespace(namespace) {
            return DispatchOutcome::Ignored(IgnoreReason::NotATarget);
        }

        info!(namespace = namespace, "namespace.joined.catch_up");
        DispatchOutcome::CaughtUp {
            namespace: namespace.to_string(),
            report: self.resync.catch_up(&rule, namespace).await,
        }
    }
}
