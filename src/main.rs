//! # Configuration Distributor
//!
//! A Kubernetes controller that copies ConfigMaps and Secrets from the
//! namespace of a `ConfigurationDistributionRule` into the namespaces the rule
//! lists.
//!
//! ## Overview
//!
//! 1. **Rule** - one rule per process, pinned by namespace and name
//! 2. **Sources** - artifacts in the rule's namespace whose `rule` label equals
//!    the rule selector (any artifact when the selector is empty)
//! 3. **Replication** - create-or-update into every target namespace, never delete
//! 4. **Resync** - a changed rule, a newly created target namespace or the
//!    periodic timer triggers a pass over all current sources
//!
//! Settings come from the environment (`RULE_NAMESPACE`, `RULE_NAME`,
//! `LOG_LEVEL`, `LOG_FORMAT`, `REPLICATION_CONCURRENCY`, `RESYNC_INTERVAL`) and can be
//! overridden by command line flags.

use anyhow::Result;
use clap::Parser;
use config_distributor::config::{ControllerConfig, LogFormat};
use config_distributor::runtime::initialization::initialize;
use config_distributor::runtime::watch_loop::run_watch_loop;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Command line overrides; anything unset falls back to the environment
#[derive(Debug, Parser)]
#[command(name = "config-distributor", version, about)]
struct Args {
    /// Namespace of the distribution rule (env: RULE_NAMESPACE, NAMESPACE)
    #[arg(long)]
    rule_namespace: Option<String>,

    /// Name of the distribution rule (env: RULE_NAME, RULENAME)
    #[arg(long)]
    rule_name: Option<String>,

    /// Log level: error, warn, info, debug, trace (env: LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: text or json (env: LOG_FORMAT)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Target namespaces written concurrently per artifact (env: REPLICATION_CONCURRENCY)
    #[arg(long)]
    replication_concurrency: Option<usize>,

    /// Seconds between periodic resync passes, 0 disables (env: RESYNC_INTERVAL)
    #[arg(long)]
    resync_interval: Option<u64>,
}

impl Args {
    fn apply(self, config: &mut ControllerConfig) {
        if let Some(namespace) = self.rule_namespace {
            config.rule_namespace = namespace;
        }
        if let Some(name) = self.rule_name {
            config.rule_name = name;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(concurrency) = self.replication_concurrency {
            config.replication_concurrency = concurrency.max(1);
        }
        if let Some(seconds) = self.resync_interval {
            config.resync_interval = Duration::from_secs(seconds);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = ControllerConfig::from_env();
    Args::parse().apply(&mut config);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let init = initialize(config, shutdown.clone()).await?;
    let resync_interval = init.config.resync_interval;

    match run_watch_loop(init.client, init.distributor, resync_interval, shutdown).await {
        Ok(()) => {
            info!("Controller stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Controller stopped on a fatal watch error");
            Err(e.into())
        }
    }
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler, relying on SIGINT only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
    shutdown.cancel();
}
