//! Watch loop tests
//!
//! Stream pumping, shutdown, and fail-fast behavior of the watch tasks,
//! driven by in-memory streams instead of a cluster.

mod common;

use common::{configmap, configmap_value, distributor, eventually, rule, MemoryCluster};
use config_distributor::prelude::*;
use config_distributor::runtime::watch_loop::{resync_loop, run_streams, watch_stream, WatchTask};
use futures::{stream, FutureExt, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube_runtime::watcher;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Item<K> = Result<watcher::Event<K>, String>;

fn home_rule() -> ConfigurationDistributionRule {
    rule(
        "home",
        "default-rule",
        "1",
        DistributionMode::Both,
        None,
        &["ns-a"],
    )
}

/// A task that only stops when cancelled
fn idle_task(
    class: ResourceClass,
    distributor: &Arc<Distributor>,
    shutdown: &CancellationToken,
) -> WatchTask {
    let events = stream::pending::<Item<ConfigMap>>();
    (
        class,
        watch_stream(
            class,
            events,
            Arc::clone(distributor),
            shutdown.clone(),
            DispatchEvent::ConfigMap,
        )
        .boxed(),
    )
}

#[tokio::test]
async fn test_stream_events_reach_the_distributor() {
    let cluster = MemoryCluster::new();
    let distributor = Arc::new(distributor(&cluster));
    let shutdown = CancellationToken::new();

    let rule_events = stream::iter(vec![
        Ok(watcher::Event::Init),
        Ok(watcher::Event::InitApply(home_rule())),
        Ok(watcher::Event::InitDone),
    ])
    .chain(stream::pending::<Item<ConfigurationDistributionRule>>());
    let configmap_events = stream::iter(vec![Ok(watcher::Event::Apply(configmap(
        "home", "app", None, "v1",
    )))])
    .chain(stream::pending::<Item<ConfigMap>>());

    let rule_task = tokio::spawn(watch_stream(
        ResourceClass::Rule,
        rule_events,
        Arc::clone(&distributor),
        shutdown.clone(),
        DispatchEvent::Rule,
    ));

    eventually(|| distributor.state() == EngineState::RuleActive).await;

    let configmap_task = tokio::spawn(watch_stream(
        ResourceClass::ConfigMap,
        configmap_events,
        Arc::clone(&distributor),
        shutdown.clone(),
        DispatchEvent::ConfigMap,
    ));

    eventually(|| configmap_value(&cluster, "ns-a", "app").is_some()).await;

    shutdown.cancel();
    assert!(rule_task.await.unwrap().is_ok());
    assert!(configmap_task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_repeated_apply_is_dispatched_as_modified() {
    let cluster = MemoryCluster::new();
    let distributor = Arc::new(distributor(&cluster));
    distributor
        .dispatch(DispatchEvent::Rule(ChangeType::Added, home_rule()))
        .await;
    let shutdown = CancellationToken::new();

    let events = stream::iter(vec![
        Ok(watcher::Event::Apply(configmap("home", "app", None, "v1"))),
        Ok(watcher::Event::Apply(configmap("home", "app", None, "v2"))),
    ])
    .chain(stream::pending::<Item<ConfigMap>>());

    let task = tokio::spawn(watch_stream(
        ResourceClass::ConfigMap,
        events,
        Arc::clone(&distributor),
        shutdown.clone(),
        DispatchEvent::ConfigMap,
    ));

    eventually(|| configmap_value(&cluster, "ns-a", "app").as_deref() == Some("v2")).await;
    shutdown.cancel();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_stream_error_cancels_the_other_streams() {
    let cluster = MemoryCluster::new();
    let distributor = Arc::new(distributor(&cluster));
    let shutdown = CancellationToken::new();

    let failing = stream::iter(vec![Err::<watcher::Event<ConfigMap>, String>(
        "secrets is forbidden: cannot watch (403)".to_string(),
    )]);
    let tasks = vec![
        idle_task(ResourceClass::Rule, &distributor, &shutdown),
        (
            ResourceClass::Secret,
            watch_stream(
                ResourceClass::Secret,
                failing,
                Arc::clone(&distributor),
                shutdown.clone(),
                DispatchEvent::ConfigMap,
            )
            .boxed(),
        ),
        idle_task(ResourceClass::Namespace, &distributor, &shutdown),
    ];

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        run_streams(tasks, shutdown.clone()),
    )
    .await
    .expect("run_streams must return once a stream fails");

    match result {
        Err(DistributorError::WatchFailed { stream, reason, .. }) => {
            assert_eq!(stream, ResourceClass::Secret);
            assert_eq!(reason, "forbidden");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(shutdown.is_cancelled());
}

#[tokio::test]
async fn test_stream_end_is_fatal() {
    let cluster = MemoryCluster::new();
    let distributor = Arc::new(distributor(&cluster));
    let shutdown = CancellationToken::new();

    let ended = stream::iter(Vec::<Item<ConfigMap>>::new());
    let tasks = vec![
        (
            ResourceClass::ConfigMap,
            watch_stream(
                ResourceClass::ConfigMap,
                ended,
                Arc::clone(&distributor),
                shutdown.clone(),
                DispatchEvent::ConfigMap,
            )
            .boxed(),
        ),
        idle_task(ResourceClass::Rule, &distributor, &shutdown),
    ];

    let result = run_streams(tasks, shutdown.clone()).await;

    assert!(matches!(
        result,
        Err(DistributorError::WatchEnded {
            stream: ResourceClass::ConfigMap
        })
    ));
    assert!(shutdown.is_cancelled());
}

#[tokio::test]
async fn test_shutdown_stops_all_streams_cleanly() {
    let cluster = MemoryCluster::new();
    let distributor = Arc::new(distributor(&cluster));
    let shutdown = CancellationToken::new();

    let tasks = vec![
        idle_task(ResourceClass::Rule, &distributor, &shutdown),
        idle_task(ResourceClass::ConfigMap, &distributor, &shutdown),
        idle_task(ResourceClass::Secret, &distributor, &shutdown),
        idle_task(ResourceClass::Namespace, &distributor, &shutdown),
    ];

    let runner = tokio::spawn(run_streams(tasks, shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("streams must stop after cancellation")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_first_failure_wins() {
    let cluster = MemoryCluster::new();
    let distributor = Arc::new(distributor(&cluster));
    let shutdown = CancellationToken::new();

    let first = stream::iter(vec![Err::<watcher::Event<ConfigMap>, String>(
        "Unauthorized (401)".to_string(),
    )]);
    let second = stream::once(async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Err::<watcher::Event<ConfigMap>, String>("connection reset".to_string())
    });
    let tasks = vec![
        (
            ResourceClass::Rule,
            watch_stream(
                ResourceClass::Rule,
                first,
                Arc::clone(&distributor),
                shutdown.clone(),
                DispatchEvent::ConfigMap,
            )
            .boxed(),
        ),
        (
            ResourceClass::Namespace,
            watch_stream(
                ResourceClass::Namespace,
                second,
                Arc::clone(&distributor),
                shutdown.clone(),
                DispatchEvent::ConfigMap,
            )
            .boxed(),
        ),
    ];

    let result = run_streams(tasks, shutdown).await;

    match result {
        Err(e) => assert_eq!(e.stream(), ResourceClass::Rule),
        Ok(()) => panic!("expected a failure"),
    }
}

#[tokio::test]
async fn test_cancel_lets_the_event_in_flight_finish() {
    let cluster = MemoryCluster::new();
    let distributor = Arc::new(distributor(&cluster));
    distributor
        .dispatch(DispatchEvent::Rule(ChangeType::Added, home_rule()))
        .await;
    cluster.hold_writes();
    let shutdown = CancellationToken::new();

    let events = stream::iter(vec![Ok(watcher::Event::Apply(configmap(
        "home", "app", None, "v1",
    )))])
    .chain(stream::pending::<Item<ConfigMap>>());
    let task = tokio::spawn(watch_stream(
        ResourceClass::ConfigMap,
        events,
        Arc::clone(&distributor),
        shutdown.clone(),
        DispatchEvent::ConfigMap,
    ));

    eventually(|| cluster.held_writes() == 1).await;
    shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!task.is_finished(), "stream must finish its event first");

    cluster.release_writes();
    let result = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("stream must stop once the event is done")
        .unwrap();

    assert!(result.is_ok());
    assert_eq!(configmap_value(&cluster, "ns-a", "app").as_deref(), Some("v1"));
}

#[tokio::test(start_paused = true)]
async fn test_periodic_resync_retries_failed_writes() {
    let cluster = MemoryCluster::new();
    cluster.seed(configmap("home", "app", None, "v1").into());
    let distributor = Arc::new(distributor(&cluster));

    cluster.fail_writes_in("ns-a");
    distributor
        .dispatch(DispatchEvent::Rule(ChangeType::Added, home_rule()))
        .await;
    assert!(configmap_value(&cluster, "ns-a", "app").is_none());
    cluster.heal_writes_in("ns-a");

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(resync_loop(
        Arc::clone(&distributor),
        Duration::from_secs(30),
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(configmap_value(&cluster, "ns-a", "app").is_none());

    tokio::time::sleep(Duration::from_secs(2)).await;
    eventually(|| configmap_value(&cluster, "ns-a", "app").is_some()).await;

    shutdown.cancel();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_periodic_resync_uses_the_current_rule() {
    let cluster = MemoryCluster::new();
    cluster.seed(configmap("home", "app", None, "v1").into());
    let distributor = Arc::new(distributor(&cluster));
    let shutdown = CancellationToken::new();

    let task = tokio::spawn(resync_loop(
        Arc::clone(&distributor),
        Duration::from_secs(30),
        shutdown.clone(),
    ));

    // Ticks without a rule do nothing
    tokio::time::sleep(Duration::from_secs(95)).await;
    assert!(cluster.list_selectors().is_empty());

    // Stored directly, so only the timer can replicate it
    distributor.rules().set(Some(home_rule()));
    tokio::time::sleep(Duration::from_secs(30)).await;
    eventually(|| configmap_value(&cluster, "ns-a", "app").is_some()).await;

    shutdown.cancel();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_zero_resync_period_idles_until_shutdown() {
    let cluster = MemoryCluster::new();
    let distributor = Arc::new(distributor(&cluster));
    let shutdown = CancellationToken::new();

    let task = tokio::spawn(resync_loop(distributor, Duration::ZERO, shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!task.is_finished());

    shutdown.cancel();
    assert!(task.await.unwrap().is_ok());
    assert!(cluster.list_selectors().is_empty());
}
