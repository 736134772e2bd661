//! # Resync
//!
//! Re-enumerates the source artifacts matching a rule snapshot and replicates
//! them. Two triggers share the mechanism:
//!
//! - rule changed: replicate into every target of the new rule
//! - namespace joined: replicate into that one namespace only
//!
//! A third trigger, the periodic pass, repeats the rule-changed pass on a
//! timer so failed writes are retried without waiting for a new event.
//!
//! The caller passes the rule snapshot; the whole pass uses it even if the
//! stored rule changes meanwhile. Nothing is ever deleted from a target.
//! Once shutdown is signalled a pass stops before its next artifact; the
//! write in flight completes.

use crate::constants::SELECTOR_LABEL_KEY;
use crate::controller::artifact::Artifact;
use crate::controller::client::ArtifactClient;
use crate::controller::matcher::{explain, MatchOutcome};
use crate::controller::replicator::Replicator;
use crate::crd::ConfigurationDistributionRule;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters for one resync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncReport {
    /// Source artifacts that matched the rule
    pub matched: usize,
    /// Replica writes that succeeded
    pub written: usize,
    /// Replica writes that failed
    pub failed: usize,
    /// Artifact kinds whose enumeration failed
    pub list_errors: usize,
    /// Shutdown stopped the pass before every source was written
    pub interrupted: bool,
}

/// Enumerate-and-replicate passes over the rule's home namespace
#[derive(Clone)]
pub struct Resync {
    client: Arc<dyn ArtifactClient>,
    replicator: Replicator,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Resync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resync")
            .field("replicator", &self.replicator)
            .finish_non_exhaustive()
    }
}

impl Resync {
    #[must_use]
    pub fn new(client: Arc<dyn ArtifactClient>, replicator: Replicator) -> Self {
        Self {
            client,
            replicator,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop passes between artifacts once `shutdown` is cancelled
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Replicate every matching source into all targets of `rule`
    pub async fn full(&self, rule: &ConfigurationDistributionRule) -> ResyncReport {
        let targets = rule.targets();
        self.run(rule, &targets, "rule-changed").await
    }

    /// Timer-driven repeat of [`Resync::full`]
    pub async fn periodic(&self, rule: &ConfigurationDistributionRule) -> ResyncReport {
        let targets = rule.targets();
        self.run(rule, &targets, "periodic").await
    }

    /// Replicate every matching source into the newly joined `namespace` only
    pub async fn catch_up(
        &self,
        rule: &ConfigurationDistributionRule,
        namespace: &str,
    ) -> ResyncReport {
        let targets = [namespace.to_string()];
        self.run(rule, &targets, "namespace-joined").await
    }

    async fn run(
        &self,
        rule: &ConfigurationDistributionRule,
        targets: &[String],
        trigger: &'static str,
    ) -> ResyncReport {
        let mut report = ResyncReport::default();

        if targets.is_empty() {
            info!(trigger = trigger, "resync.skipped.no_targets");
            return report;
        }

        let (sources, list_errors) = self.enumerate(rule).await;
        report.list_errors = list_errors;
        report.matched = sources.len();

        info!(
            trigger = trigger,
            sources = sources.len(),
            targets = targets.len(),
            "resync.started"
        );

        for artifact in &sources {
            if self.shutdown.is_cancelled() {
                report.interrupted = true;
                info!(
                    trigger = trigger,
                    written = report.written,
                    "resync.interrupted"
                );
                return report;
            }
            let replication = self.replicator.apply(artifact, targets).await;
            report.written += replication.succeeded();
            report.failed += replication.failed();
        }

        info!(
            trigger = trigger,
            matched = report.matched,
            written = report.written,
            failed = report.failed,
            list_errors = report.list_errors,
            "resync.completed"
        );

        report
    }

    /// List the current sources of `rule`, returning them with the number of
    /// kinds that could not be listed
    pub async fn enumerate(&self, rule: &ConfigurationDistributionRule) -> (Vec<Artifact>, usize) {
        let Some(home) = rule.home_namespace() else {
            warn!("resync.skipped.rule_without_namespace");
            return (Vec::new(), 0);
        };

        // Server-side filtering only when the selector is a valid label value;
        // the matcher below is authoritative either way.
        let label_selector = rule
            .selector()
            .filter(|selector| is_valid_label_value(selector))
            .map(|selector| format!("{SELECTOR_LABEL_KEY}={selector}"));

        let mut sources = Vec::new();
        let mut list_errors = 0;

        for kind in rule.spec.mode.kinds() {
            match self
                .client
                .list(*kind, home, label_selector.as_deref())
                .await
            {
                Ok(artifacts) => {
                    for artifact in artifacts {
                        match explain(&artifact, rule) {
                            MatchOutcome::Matched => sources.push(artifact),
                            outcome => debug!(
                                artifact = %artifact,
                                outcome = outcome.as_str(),
                                "resync.source.skipped"
                            ),
                        }
                    }
                }
                Err(e) => {
                    list_errors += 1;
                    warn!(
                        kind = kind.as_str(),
                        namespace = home,
                        error = %e,
                        "resync.list.failed"
                    );
                }
            }
        }

        (sources, list_errors)
    }
}

/// Kubernetes label value syntax: at most 63 characters, alphanumerics plus
/// `-`, `_`, `.`, beginning and ending with an alphanumeric
fn is_valid_label_value(value: &str) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
        && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}
