//! # Watch Loop
//!
//! Runs the four watch streams (rule, ConfigMaps, Secrets, Namespaces) and
//! feeds their events to the distributor. A fifth task repeats the full
//! resync on a timer so failed writes are retried.
//!
//! Each stream handles its events strictly one after another. The streams run
//! as independent tasks sharing one cancellation token: shutdown cancels them
//! all, and the first stream to fail or end cancels the rest and its error
//! becomes the result. A cancelled stream finishes the event it is dispatching
//! before it stops.

use crate::controller::dispatcher::{DispatchEvent, Distributor};
use crate::controller::types::{ChangeType, DistributorError, ResourceClass};
use crate::crd::ConfigurationDistributionRule;
use crate::runtime::change_tracker::ChangeTracker;
use crate::runtime::error_policy::watch_failure;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, Stream, StreamExt};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::api::Api;
use kube::{Client, Resource, ResourceExt};
use kube_runtime::watcher;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A named watch task ready to be spawned
pub type WatchTask = (ResourceClass, BoxFuture<'static, Result<(), DistributorError>>);

/// Start all four watches against the cluster and run until shutdown or failure
///
/// A zero `resync_interval` disables the periodic resync.
pub async fn run_watch_loop(
    client: Client,
    distributor: Arc<Distributor>,
    resync_interval: Duration,
    shutdown: CancellationToken,
) -> Result<(), DistributorError> {
    let rule_ref = distributor.rule_ref().clone();
    info!(rule = %rule_ref, "Starting watch streams...");

    let rules: Api<ConfigurationDistributionRule> =
        Api::namespaced(client.clone(), &rule_ref.namespace);
    let rule_events = watcher(
        rules,
        watcher::Config::default().fields(&format!("metadata.name={}", rule_ref.name)),
    );

    let configmaps: Api<ConfigMap> = Api::all(client.clone());
    let configmap_events = watcher(configmaps, watcher::Config::default());

    let secrets: Api<Secret> = Api::all(client.clone());
    let secret_events = watcher(secrets, watcher::Config::default());

    let namespaces: Api<Namespace> = Api::all(client);
    let namespace_events = watcher(namespaces, watcher::Config::default());

    let mut tasks: Vec<WatchTask> = vec![
        (
            ResourceClass::Rule,
            watch_stream(
                ResourceClass::Rule,
                rule_events,
                Arc::clone(&distributor),
                shutdown.clone(),
                DispatchEvent::Rule,
            )
            .boxed(),
        ),
        (
            ResourceClass::ConfigMap,
            watch_stream(
                ResourceClass::ConfigMap,
                configmap_events,
                Arc::clone(&distributor),
                shutdown.clone(),
                DispatchEvent::ConfigMap,
            )
            .boxed(),
        ),
        (
            ResourceClass::Secret,
            watch_stream(
                ResourceClass::Secret,
                secret_events,
                Arc::clone(&distributor),
                shutdown.clone(),
                DispatchEvent::Secret,
            )
            .boxed(),
        ),
        (
            ResourceClass::Namespace,
            watch_stream(
                ResourceClass::Namespace,
                namespace_events,
                Arc::clone(&distributor),
                shutdown.clone(),
                |change, namespace: Namespace| {
                    DispatchEvent::Namespace(change, namespace.name_any())
                },
            )
            .boxed(),
        ),
    ];

    // Resync passes are rule-driven, so failures surface under the rule stream
    if resync_interval.is_zero() {
        info!("Periodic resync disabled");
    } else {
        tasks.push((
            ResourceClass::Rule,
            resync_loop(distributor, resync_interval, shutdown.clone()).boxed(),
        ));
    }

    run_streams(tasks, shutdown).await
}

/// Re-run the full resync against the current rule every `period`
///
/// The first pass comes one `period` after start, bootstrap has just resynced.
/// Ticks with no active rule are skipped. Returns `Ok(())` once `shutdown`
/// fires; a pass in progress stops before its next artifact.
pub async fn resync_loop(
    distributor: Arc<Distributor>,
    period: Duration,
    shutdown: CancellationToken,
) -> Result<(), DistributorError> {
    if period.is_zero() {
        shutdown.cancelled().await;
        return Ok(());
    }

    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                debug!("resync.periodic.cancelled");
                return Ok(());
            }
            _ = ticks.tick() => {
                if distributor.resync_current().await.is_none() {
                    debug!("resync.periodic.skipped.no_rule");
                }
            }
        }
    }
}

/// Pump one watcher stream into the distributor until cancelled
///
/// Returns `Ok(())` only when `shutdown` fires. A stream error or the stream
/// ending is fatal.
pub async fn watch_stream<K, S, E, F>(
    class: ResourceClass,
    events: S,
    distributor: Arc<Distributor>,
    shutdown: CancellationToken,
    to_event: F,
) -> Result<(), DistributorError>
where
    K: Resource,
    S: Stream<Item = Result<watcher::Event<K>, E>>,
    E: Display,
    F: Fn(ChangeType, K) -> DispatchEvent,
{
    let mut events = std::pin::pin!(events);
    let mut tracker = ChangeTracker::new();

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                debug!(stream = class.as_str(), "watch.stream.cancelled");
                return Ok(());
            }
            next = events.next() => match next {
                Some(Ok(event)) => {
                    if let Some((change, obj)) = tracker.observe(event) {
                        distributor.dispatch(to_event(change, obj)).await;
                    }
                }
                Some(Err(e)) => return Err(watch_failure(class, &e.to_string())),
                None => {
                    warn!(stream = class.as_str(), "watch.stream.ended");
                    return Err(DistributorError::WatchEnded { stream: class });
                }
            }
        }
    }
}

/// Run watch tasks concurrently until all have stopped
///
/// The first failure cancels `shutdown` so the remaining tasks stop, and is
/// returned once every task has finished.
pub async fn run_streams(
    tasks: Vec<WatchTask>,
    shutdown: CancellationToken,
) -> Result<(), DistributorError> {
    let mut running: FuturesUnordered<_> = tasks
        .into_iter()
        .map(|(class, task)| {
            debug!(stream = class.as_str(), "watch.stream.started");
            tokio::spawn(task).map(move |joined| (class, joined))
        })
        .collect();

    let mut first_error: Option<DistributorError> = None;

    while let Some((class, joined)) = running.next().await {
        let outcome = joined.unwrap_or_else(|e| {
            Err(DistributorError::TaskAborted {
                stream: class,
                message: e.to_string(),
            })
        });

        if let Err(e) = outcome {
            if first_error.is_none() {
                error!(stream = e.stream().as_str(), error = %e, "watch.stream.fatal");
                shutdown.cancel();
                first_error = Some(e);
            } else {
                debug!(error = %e, "watch.stream.secondary_failure");
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            info!("All watch streams stopped");
            Ok(())
        }
    }
}
