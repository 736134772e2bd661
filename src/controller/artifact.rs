//! # Artifacts
//!
//! The two kinds of configuration artifacts the distributor copies:
//! ConfigMaps (plain key/value bundles) and Secrets (secret-bearing bundles).

use crate::constants::LAST_APPLIED_ANNOTATION;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::fmt;

/// Artifact kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    ConfigMap,
    Secret,
}

impl ArtifactKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::ConfigMap => "configmap",
            ArtifactKind::Secret => "secret",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed snapshot of one artifact
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    ConfigMap(ConfigMap),
    Secret(Secret),
}

impl From<ConfigMap> for Artifact {
    fn from(config_map: ConfigMap) -> Self {
        Artifact::ConfigMap(config_map)
    }
}

impl From<Secret> for Artifact {
    fn from(secret: Secret) -> Self {
        Artifact::Secret(secret)
    }
}

impl Artifact {
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::ConfigMap(_) => ArtifactKind::ConfigMap,
            Artifact::Secret(_) => ArtifactKind::Secret,
        }
    }

    #[must_use]
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Artifact::ConfigMap(cm) => &cm.metadata,
            Artifact::Secret(secret) => &secret.metadata,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.meta().namespace.as_deref()
    }

    #[must_use]
    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.meta().labels.as_ref()
    }

    /// Value of a single label
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels().and_then(|labels| labels.get(key)).map(String::as_str)
    }

    /// Version token (`metadata.resourceVersion`)
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.meta().resource_version.as_deref()
    }

    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.meta().uid.as_deref()
    }

    /// `kind/namespace/name`, used as log field and tracking key
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.kind(),
            self.namespace().unwrap_or("-"),
            self.name()
        )
    }

    /// Build the replica of this artifact for `target_namespace`
    ///
    /// The replica keeps name, labels, annotations and the full payload.
    /// Identity and server-managed fields (resourceVersion, uid,
    /// creationTimestamp, generation, managedFields, ownerReferences,
    /// finalizers) are not carried over.
    #[must_use]
    pub fn replica_for(&self, target_namespace: &str) -> Artifact {
        let metadata = replica_meta(self.meta(), target_namespace);
        match self {
            Artifact::ConfigMap(cm) => Artifact::ConfigMap(ConfigMap {
                metadata,
                data: cm.data.clone(),
                binary_data: cm.binary_data.clone(),
                immutable: cm.immutable,
            }),
            Artifact::Secret(secret) => Artifact::Secret(Secret {
                metadata,
                data: secret.data.clone(),
                string_data: secret.string_data.clone(),
                type_: secret.type_.clone(),
                immutable: secret.immutable,
            }),
        }
    }

    /// Whether both artifacts carry the same payload (data, binary data, type)
    #[must_use]
    pub fn same_payload(&self, other: &Artifact) -> bool {
        match (self, other) {
            (Artifact::ConfigMap(a), Artifact::ConfigMap(b)) => {
                a.data == b.data && a.binary_data == b.binary_data
            }
            (Artifact::Secret(a), Artifact::Secret(b)) => {
                a.data == b.data && a.string_data == b.string_data && a.type_ == b.type_
            }
            _ => false,
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

fn replica_meta(source: &ObjectMeta, target_namespace: &str) -> ObjectMeta {
    let annotations = source
        .annotations
        .as_ref()
        .map(|annotations| {
            annotations
                .iter()
                .filter(|(key, _)| key.as_str() != LAST_APPLIED_ANNOTATION)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect::<BTreeMap<_, _>>()
        })
        .filter(|annotations| !annotations.is_empty());

    ObjectMeta {
        name: source.name.clone(),
        namespace: Some(target_namespace.to_string()),
        labels: source.labels.clone(),
        annotations,
        ..ObjectMeta::default()
    }
}
