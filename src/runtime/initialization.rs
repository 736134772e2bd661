//! # Initialization
//!
//! Controller startup: rustls provider, tracing, Kubernetes client, the
//! distributor, and the initial fetch of the pinned rule.

use crate::config::ControllerConfig;
use crate::controller::client::{KubeArtifactClient, KubeRuleClient};
use crate::controller::dispatcher::{DispatchOutcome, Distributor};
use crate::observability;
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything the watch loop needs
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Distribution engine, already bootstrapped
    pub distributor: Arc<Distributor>,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("distributor", &self.distributor)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Kubernetes client creation
/// - Distributor setup and rule bootstrap
///
/// `shutdown` also interrupts the bootstrap resync.
pub async fn initialize(
    config: ControllerConfig,
    shutdown: CancellationToken,
) -> Result<InitializationResult> {
    // Must run before any TLS connection is made
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    observability::init_logging(&config).context("Failed to initialize logging")?;

    if !provider_installed {
        debug!("rustls crypto provider was already installed");
    }

    info!("Starting Configuration Distributor");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        rule.namespace = config.rule_namespace.as_str(),
        rule.name = config.rule_name.as_str(),
        replication_concurrency = config.replication_concurrency,
        resync_interval_secs = config.resync_interval.as_secs(),
        "controller.config.loaded"
    );

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let distributor = Arc::new(
        Distributor::new(
            config.rule_ref(),
            Arc::new(KubeArtifactClient::new(client.clone())),
            config.replication_concurrency,
        )
        .with_shutdown(shutdown),
    );

    // A missing rule is not an error; the rule watch picks it up later
    let bootstrap = distributor
        .bootstrap(&KubeRuleClient::new(client.clone()))
        .await;
    if let DispatchOutcome::RuleApplied(report) = bootstrap {
        info!(
            matched = report.matched,
            written = report.written,
            failed = report.failed,
            "controller.bootstrap.resynced"
        );
    }

    info!("Controller initialized, starting watch streams...");

    Ok(InitializationResult {
        client,
        distributor,
        config,
    })
}
