//! # Replicator
//!
//! Idempotent create-or-update of one artifact into a set of target namespaces.
//!
//! Every target is attempted independently: a failing namespace is logged and
//! reported, the others still get written. Nothing is retried inside one call;
//! the next matching event or resync pass is the retry.

use crate::controller::artifact::Artifact;
use crate::controller::client::{ArtifactClient, ClientError};
use futures::{stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a replica was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaOutcome {
    Created,
    Updated,
}

impl ReplicaOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReplicaOutcome::Created => "created",
            ReplicaOutcome::Updated => "updated",
        }
    }
}

/// Outcome for a single target namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetResult {
    pub namespace: String,
    pub result: Result<ReplicaOutcome, ClientError>,
}

/// Per-target outcomes of one `apply` call, in target order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationReport {
    pub artifact: String,
    pub results: Vec<TargetResult>,
}

impl ReplicationReport {
    /// Number of targets written successfully
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_ok()).count()
    }

    /// Number of targets that failed
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Result for one target namespace
    #[must_use]
    pub fn outcome_for(&self, namespace: &str) -> Option<&Result<ReplicaOutcome, ClientError>> {
        self.results
            .iter()
            .find(|r| r.namespace == namespace)
            .map(|r| &r.result)
    }
}

/// Writes replicas through an `ArtifactClient`
#[derive(Clone)]
pub struct Replicator {
    client: Arc<dyn ArtifactClient>,
    concurrency: usize,
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl Replicator {
    /// `concurrency` bounds how many target namespaces are written at once
    #[must_use]
    pub fn new(client: Arc<dyn ArtifactClient>, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    /// Replicate `artifact` into every namespace in `targets`
    ///
    /// The artifact's own namespace is never a target: writing there would
    /// overwrite the source with its stripped replica.
    pub async fn apply(&self, artifact: &Artifact, targets: &[String]) -> ReplicationReport {
        let key = artifact.key();
        let home = artifact.namespace();
        let targets: Vec<String> = targets
            .iter()
            .filter(|target| {
                let is_home = home == Some(target.as_str());
                if is_home {
                    debug!(
                        artifact = key.as_str(),
                        target = target.as_str(),
                        "replication.target.skipped_source_namespace"
                    );
                }
                !is_home
            })
            .cloned()
            .collect();

        info!(
            artifact = key.as_str(),
            targets = targets.len(),
            "replication.started"
        );

        let mut indexed: Vec<(usize, TargetResult)> = stream::iter(targets.into_iter().enumerate())
            .map(|(index, target)| async move {
                let result = self.apply_to(artifact, &target).await;
                (
                    index,
                    TargetResult {
                        namespace: target,
                        result,
                    },
                )
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);

        let report = ReplicationReport {
            artifact: key,
            results: indexed.into_iter().map(|(_, result)| result).collect(),
        };

        for target in &report.results {
            match &target.result {
                Ok(outcome) => info!(
                    artifact = report.artifact.as_str(),
                    target = target.namespace.as_str(),
                    outcome = outcome.as_str(),
                    "replication.target.applied"
                ),
                Err(e) => warn!(
                    artifact = report.artifact.as_str(),
                    target = target.namespace.as_str(),
                    error = %e,
                    "replication.target.failed"
                ),
            }
        }

        if report.failed() > 0 {
            warn!(
                artifact = report.artifact.as_str(),
                succeeded = report.succeeded(),
                failed = report.failed(),
                "replication.partial"
            );
        }

        report
    }

    /// Create the replica, falling back to a full overwrite when it already exists
    async fn apply_to(
        &self,
        artifact: &Artifact,
        target: &str,
    ) -> Result<ReplicaOutcome, ClientError> {
        let replica = artifact.replica_for(target);

        match self.client.create(target, &replica).await {
            Ok(_) => Ok(ReplicaOutcome::Created),
            Err(e) if e.is_already_exists() => {
                debug!(
                    artifact = %artifact,
                    target = target,
                    "replica exists, overwriting"
                );
                self.client
                    .update(target, &replica)
                    .await
                    .map(|_| ReplicaOutcome::Updated)
            }
            Err(e) => Err(e),
        }
    }
}
