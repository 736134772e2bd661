//! Common test utilities
//!
//! An in-memory cluster implementing the client seams, plus builders for
//! rules, ConfigMaps and Secrets.

#![allow(dead_code, reason = "each test binary uses a subset of the helpers")]

use async_trait::async_trait;
use config_distributor::prelude::*;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Write operation recorded by the in-memory cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
}

/// One successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub op: WriteOp,
    pub kind: ArtifactKind,
    pub namespace: String,
    pub name: String,
    /// Version token carried by the written object, as sent by the caller
    pub sent_version: Option<String>,
}

type ObjectKey = (ArtifactKind, String, String);

/// In-memory stand-in for the Kubernetes API
#[derive(Debug, Default)]
pub struct MemoryCluster {
    objects: Mutex<HashMap<ObjectKey, Artifact>>,
    writes: Mutex<Vec<Write>>,
    failing_namespaces: Mutex<HashSet<String>>,
    failing_lists: Mutex<HashSet<ArtifactKind>>,
    list_selectors: Mutex<Vec<Option<String>>>,
    versions: AtomicU64,
    write_gate: Mutex<Option<Arc<Semaphore>>>,
    held_writes: AtomicUsize,
}

impl MemoryCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store `artifact` as-is, bypassing the write log
    pub fn seed(&self, artifact: Artifact) {
        let key = key_of(&artifact);
        self.objects.lock().unwrap().insert(key, artifact);
    }

    /// Make every write into `namespace` fail with a server error
    pub fn fail_writes_in(&self, namespace: &str) {
        self.failing_namespaces
            .lock()
            .unwrap()
            .insert(namespace.to_string());
    }

    /// Let writes into `namespace` succeed again
    pub fn heal_writes_in(&self, namespace: &str) {
        self.failing_namespaces.lock().unwrap().remove(namespace);
    }

    /// Park every write until [`MemoryCluster::release_writes`]
    pub fn hold_writes(&self) {
        *self.write_gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let parked and future writes through
    pub fn release_writes(&self) {
        if let Some(gate) = self.write_gate.lock().unwrap().take() {
            gate.close();
        }
    }

    /// Writes currently parked at the gate
    pub fn held_writes(&self) -> usize {
        self.held_writes.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) {
        let gate = self.write_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.held_writes.fetch_add(1, Ordering::SeqCst);
            // Closing the gate wakes every waiter with an error
            let _ = gate.acquire().await;
            self.held_writes.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Make every list of `kind` fail
    pub fn fail_lists_of(&self, kind: ArtifactKind) {
        self.failing_lists.lock().unwrap().insert(kind);
    }

    pub fn object(&self, kind: ArtifactKind, namespace: &str, name: &str) -> Option<Artifact> {
        self.objects
            .lock()
            .unwrap()
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    /// Namespaces written to, in write order
    pub fn written_namespaces(&self) -> Vec<String> {
        self.writes().into_iter().map(|w| w.namespace).collect()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    /// Label selectors passed to `list`, in call order
    pub fn list_selectors(&self) -> Vec<Option<String>> {
        self.list_selectors.lock().unwrap().clone()
    }

    /// Number of objects of `kind` stored in `namespace`
    pub fn count_in(&self, kind: ArtifactKind, namespace: &str) -> usize {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, ns, _)| *k == kind && ns == namespace)
            .count()
    }

    fn check_writable(&self, namespace: &str) -> Result<(), ClientError> {
        if self.failing_namespaces.lock().unwrap().contains(namespace) {
            return Err(ClientError::Api {
                code: 500,
                message: format!("injected failure in {namespace}"),
            });
        }
        Ok(())
    }

    fn stamp(&self, artifact: &Artifact, namespace: &str) -> Artifact {
        let version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stored = artifact.clone();
        let meta = match &mut stored {
            Artifact::ConfigMap(cm) => &mut cm.metadata,
            Artifact::Secret(secret) => &mut secret.metadata,
        };
        meta.namespace = Some(namespace.to_string());
        meta.resource_version = Some(version.to_string());
        stored
    }

    fn record(&self, op: WriteOp, artifact: &Artifact, namespace: &str) {
        self.writes.lock().unwrap().push(Write {
            op,
            kind: artifact.kind(),
            namespace: namespace.to_string(),
            name: artifact.name().to_string(),
            sent_version: artifact.version().map(str::to_string),
        });
    }
}

#[async_trait]
impl ArtifactClient for MemoryCluster {
    async fn get(
        &self,
        kind: ArtifactKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Artifact>, ClientError> {
        Ok(self.object(kind, namespace, name))
    }

    async fn list(
        &self,
        kind: ArtifactKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Artifact>, ClientError> {
        self.list_selectors
            .lock()
            .unwrap()
            .push(label_selector.map(str::to_string));

        if self.failing_lists.lock().unwrap().contains(&kind) {
            return Err(ClientError::Transport(format!("injected list failure for {kind}")));
        }

        let wanted = label_selector.and_then(|s| s.split_once('='));
        let mut found: Vec<Artifact> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .map(|(_, artifact)| artifact)
            .filter(|artifact| match wanted {
                Some((key, value)) => artifact.label(key) == Some(value),
                None => true,
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(found)
    }

    async fn create(&self, namespace: &str, artifact: &Artifact) -> Result<Artifact, ClientError> {
        self.pass_gate().await;
        self.check_writable(namespace)?;
        let key = (artifact.kind(), namespace.to_string(), artifact.name().to_string());
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists {
                kind: artifact.kind(),
                namespace: namespace.to_string(),
                name: artifact.name().to_string(),
            });
        }
        let stored = self.stamp(artifact, namespace);
        objects.insert(key, stored.clone());
        drop(objects);
        self.record(WriteOp::Create, artifact, namespace);
        Ok(stored)
    }

    async fn update(&self, namespace: &str, artifact: &Artifact) -> Result<Artifact, ClientError> {
        self.pass_gate().await;
        self.check_writable(namespace)?;
        let key = (artifact.kind(), namespace.to_string(), artifact.name().to_string());
        let mut objects = self.objects.lock().unwrap();
        if !objects.contains_key(&key) {
            return Err(ClientError::NotFound {
                kind: artifact.kind(),
                namespace: namespace.to_string(),
                name: artifact.name().to_string(),
            });
        }
        let stored = self.stamp(artifact, namespace);
        objects.insert(key, stored.clone());
        drop(objects);
        self.record(WriteOp::Update, artifact, namespace);
        Ok(stored)
    }
}

/// Rule client returning a fixed answer
#[derive(Debug)]
pub struct StaticRuleClient(pub Result<Option<ConfigurationDistributionRule>, ClientError>);

#[async_trait]
impl RuleClient for StaticRuleClient {
    async fn get(
        &self,
        _rule_ref: &RuleRef,
    ) -> Result<Option<ConfigurationDistributionRule>, ClientError> {
        self.0.clone()
    }
}

fn key_of(artifact: &Artifact) -> ObjectKey {
    (
        artifact.kind(),
        artifact.namespace().unwrap_or_default().to_string(),
        artifact.name().to_string(),
    )
}

fn labels(selector: Option<&str>) -> Option<BTreeMap<String, String>> {
    selector.map(|value| BTreeMap::from([("rule".to_string(), value.to_string())]))
}

pub fn rule(
    namespace: &str,
    name: &str,
    version: &str,
    mode: DistributionMode,
    selector: Option<&str>,
    targets: &[&str],
) -> ConfigurationDistributionRule {
    ConfigurationDistributionRule {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some(version.to_string()),
            ..Default::default()
        },
        spec: ConfigurationDistributionRuleSpec {
            mode,
            selector: selector.map(str::to_string),
            namespaces: targets.iter().map(|t| (*t).to_string()).collect(),
        },
    }
}

/// ConfigMap with one `key=value` entry and an optional `rule` label
pub fn configmap(namespace: &str, name: &str, rule_label: Option<&str>, value: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: labels(rule_label),
            resource_version: Some("1".to_string()),
            uid: Some(format!("uid-{namespace}-{name}")),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("key".to_string(), value.to_string())])),
        ..Default::default()
    }
}

/// Opaque Secret with one `password` entry and an optional `rule` label
pub fn secret(namespace: &str, name: &str, rule_label: Option<&str>, value: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: labels(rule_label),
            resource_version: Some("1".to_string()),
            uid: Some(format!("uid-{namespace}-{name}")),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "password".to_string(),
            ByteString(value.as_bytes().to_vec()),
        )])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Data value of a stored ConfigMap replica
pub fn configmap_value(cluster: &MemoryCluster, namespace: &str, name: &str) -> Option<String> {
    match cluster.object(ArtifactKind::ConfigMap, namespace, name)? {
        Artifact::ConfigMap(cm) => cm.data?.get("key").cloned(),
        Artifact::Secret(_) => None,
    }
}

/// Distributor wired to `cluster` and pinned to `home/default-rule`
pub fn distributor(cluster: &Arc<MemoryCluster>) -> Distributor {
    let client: Arc<dyn ArtifactClient> = Arc::clone(cluster) as Arc<dyn ArtifactClient>;
    Distributor::new(RuleRef::new("home", "default-rule"), client, 4)
}

/// Wait until `check` holds, failing the test after one second
pub async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
