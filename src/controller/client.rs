//! # Resource Clients
//!
//! Narrow client contracts the distributor needs from the cluster, plus their
//! kube-backed implementations. Tests swap in in-memory implementations.

use crate::controller::artifact::{Artifact, ArtifactKind};
use crate::crd::{ConfigurationDistributionRule, RuleRef};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, ListParams, PostParams};
use kube::Client;
use thiserror::Error;

/// Outcome of a failed client call, classified for the create-or-update fallback
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("{kind} '{namespace}/{name}' already exists")]
    AlreadyExists {
        kind: ArtifactKind,
        namespace: String,
        name: String,
    },
    #[error("{kind} '{namespace}/{name}' not found")]
    NotFound {
        kind: ArtifactKind,
        namespace: String,
        name: String,
    },
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClientError::AlreadyExists { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    /// Classify a kube error raised while touching `kind` `namespace/name`
    #[must_use]
    pub fn from_kube(error: kube::Error, kind: ArtifactKind, namespace: &str, name: &str) -> Self {
        match error {
            kube::Error::Api(api_err) if api_err.code == 409 => ClientError::AlreadyExists {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(api_err) if api_err.code == 404 => ClientError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(api_err) => ClientError::Api {
                code: api_err.code,
                message: api_err.message.clone(),
            },
            other => ClientError::Transport(other.to_string()),
        }
    }
}

/// Artifact access (get, list, create, update)
#[async_trait]
pub trait ArtifactClient: Send + Sync {
    /// Fetch one artifact, `None` if it does not exist
    async fn get(
        &self,
        kind: ArtifactKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Artifact>, ClientError>;

    /// List artifacts of `kind` in `namespace`, optionally filtered by a label selector
    async fn list(
        &self,
        kind: ArtifactKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Artifact>, ClientError>;

    /// Create `artifact` in `namespace`; `AlreadyExists` if a same-named object is present
    async fn create(&self, namespace: &str, artifact: &Artifact) -> Result<Artifact, ClientError>;

    /// Overwrite the same-named object in `namespace`; `NotFound` if it is absent
    async fn update(&self, namespace: &str, artifact: &Artifact) -> Result<Artifact, ClientError>;
}

/// Rule access, used once at startup before the watch delivers the rule
#[async_trait]
pub trait RuleClient: Send + Sync {
    async fn get(
        &self,
        rule_ref: &RuleRef,
    ) -> Result<Option<ConfigurationDistributionRule>, ClientError>;
}

/// `ArtifactClient` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeArtifactClient {
    client: Client,
}

impl std::fmt::Debug for KubeArtifactClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeArtifactClient").finish_non_exhaustive()
    }
}

impl KubeArtifactClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ArtifactClient for KubeArtifactClient {
    async fn get(
        &self,
        kind: ArtifactKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Artifact>, ClientError> {
        let classify = |e| ClientError::from_kube(e, kind, namespace, name);
        match kind {
            ArtifactKind::ConfigMap => Ok(self
                .config_maps(namespace)
                .get_opt(name)
                .await
                .map_err(classify)?
                .map(Artifact::from)),
            ArtifactKind::Secret => Ok(self
                .secrets(namespace)
                .get_opt(name)
                .await
                .map_err(classify)?
                .map(Artifact::from)),
        }
    }

    async fn list(
        &self,
        kind: ArtifactKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Artifact>, ClientError> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let classify = |e| ClientError::from_kube(e, kind, namespace, "*");
        match kind {
            ArtifactKind::ConfigMap => Ok(self
                .config_maps(namespace)
                .list(&params)
                .await
                .map_err(classify)?
                .items
                .into_iter()
                .map(Artifact::from)
                .collect()),
            ArtifactKind::Secret => Ok(self
                .secrets(namespace)
                .list(&params)
                .await
                .map_err(classify)?
                .items
                .into_iter()
                .map(Artifact::from)
                .collect()),
        }
    }

    async fn create(&self, namespace: &str, artifact: &Artifact) -> Result<Artifact, ClientError> {
        let classify = |e| ClientError::from_kube(e, artifact.kind(), namespace, artifact.name());
        let params = PostParams::default();
        match artifact {
            Artifact::ConfigMap(cm) => self
                .config_maps(namespace)
                .create(&params, cm)
                .await
                .map(Artifact::from)
                .map_err(classify),
            Artifact::Secret(secret) => self
                .secrets(namespace)
                .create(&params, secret)
                .await
                .map(Artifact::from)
                .map_err(classify),
        }
    }

    async fn update(&self, namespace: &str, artifact: &Artifact) -> Result<Artifact, ClientError> {
        // No resourceVersion on the payload, so the PUT is an unconditional overwrite
        let classify = |e| ClientError::from_kube(e, artifact.kind(), namespace, artifact.name());
        let params = PostParams::default();
        match artifact {
            Artifact::ConfigMap(cm) => self
                .config_maps(namespace)
                .replace(artifact.name(), &params, cm)
                .await
                .map(Artifact::from)
                .map_err(classify),
            Artifact::Secret(secret) => self
                .secrets(namespace)
                .replace(artifact.name(), &params, secret)
                .await
                .map(Artifact::from)
                .map_err(classify),
        }
    }
}

/// `RuleClient` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeRuleClient {
    client: Client,
}

impl std::fmt::Debug for KubeRuleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeRuleClient").finish_non_exhaustive()
    }
}

impl KubeRuleClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RuleClient for KubeRuleClient {
    async fn get(
        &self,
        rule_ref: &RuleRef,
    ) -> Result<Option<ConfigurationDistributionRule>, ClientError> {
        let rules: Api<ConfigurationDistributionRule> =
            Api::namespaced(self.client.clone(), &rule_ref.namespace);
        rules.get_opt(&rule_ref.name).await.map_err(|e| match e {
            kube::Error::Api(api_err) => ClientError::Api {
                code: api_err.code,
                message: api_err.message.clone(),
            },
            other => ClientError::Transport(other.to_string()),
        })
    }
}
