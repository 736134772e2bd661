//! # ConfigurationDistributionRule
//!
//! The single distribution rule a controller instance is pinned to.

use crate::controller::artifact::ArtifactKind;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ConfigurationDistributionRule Custom Resource Definition
///
/// Names which artifact kinds are copied out of the rule's own namespace,
/// which `rule` label value a source must carry, and which namespaces
/// receive the copies.
///
/// # Example
///
/// ```yaml
/// apiVersion: k8s.tideland.dev/v1alpha1
/// kind: ConfigurationDistributionRule
/// metadata:
///   name: default-rule
///   namespace: home
/// spec:
///   kind: both
///   selector: shared
///   namespaces:
///     - team-a
///     - team-b
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "ConfigurationDistributionRule",
    group = "k8s.tideland.dev",
    version = "v1alpha1",
    namespaced,
    shortname = "cdr",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Kind", "type":"string", "jsonPath":".spec.kind"}, {"name":"Selector", "type":"string", "jsonPath":".spec.selector"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationDistributionRuleSpec {
    /// Which artifact kinds are distributed: configmap, secret or both
    #[serde(rename = "kind")]
    pub mode: DistributionMode,
    /// Required value of the `rule` label on source artifacts.
    /// Empty or absent means every artifact of the covered kinds is distributed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Target namespaces receiving the replicas
    #[serde(default)]
    pub namespaces: Vec<String>,
}

/// Artifact kinds covered by a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum DistributionMode {
    /// Only ConfigMaps
    #[serde(rename = "configmap")]
    ConfigMap,
    /// Only Secrets
    #[serde(rename = "secret")]
    Secret,
    /// ConfigMaps and Secrets
    #[serde(rename = "both")]
    Both,
}

impl DistributionMode {
    /// Whether artifacts of `kind` are eligible under this mode
    #[must_use]
    pub fn covers(self, kind: ArtifactKind) -> bool {
        match self {
            DistributionMode::Both => true,
            DistributionMode::ConfigMap => kind == ArtifactKind::ConfigMap,
            DistributionMode::Secret => kind == ArtifactKind::Secret,
        }
    }

    /// Artifact kinds to enumerate during a resync
    #[must_use]
    pub fn kinds(self) -> &'static [ArtifactKind] {
        match self {
            DistributionMode::Both => &[ArtifactKind::ConfigMap, ArtifactKind::Secret],
            DistributionMode::ConfigMap => &[ArtifactKind::ConfigMap],
            DistributionMode::Secret => &[ArtifactKind::Secret],
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DistributionMode::ConfigMap => "configmap",
            DistributionMode::Secret => "secret",
            DistributionMode::Both => "both",
        }
    }
}

impl ConfigurationDistributionRule {
    /// Namespace the rule lives in; only artifacts from here are sources
    #[must_use]
    pub fn home_namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }

    /// Selector value, `None` when absent or empty
    #[must_use]
    pub fn selector(&self) -> Option<&str> {
        self.spec.selector.as_deref().filter(|s| !s.is_empty())
    }

    /// Target namespaces with duplicates and blanks removed, first occurrence wins
    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = Vec::with_capacity(self.spec.namespaces.len());
        for namespace in &self.spec.namespaces {
            let namespace = namespace.trim();
            if !namespace.is_empty() && !targets.iter().any(|t| t == namespace) {
                targets.push(namespace.to_string());
            }
        }
        targets
    }

    /// Whether `namespace` is one of the rule's targets
    #[must_use]
    pub fn targets_namespace(&self, namespace: &str) -> bool {
        !namespace.is_empty() && self.spec.namespaces.iter().any(|t| t.trim() == namespace)
    }

    /// Version token (`metadata.resourceVersion`)
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    /// Identity of this rule, if it carries a namespace
    #[must_use]
    pub fn rule_ref(&self) -> Option<RuleRef> {
        self.home_namespace()
            .map(|namespace| RuleRef::new(namespace, &self.name_any()))
    }
}

/// Identity (namespace, name) of the rule a controller is pinned to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleRef {
    pub namespace: String,
    pub name: String,
}

impl RuleRef {
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Whether `rule` has exactly this identity
    #[must_use]
    pub fn identifies(&self, rule: &ConfigurationDistributionRule) -> bool {
        rule.home_namespace() == Some(self.namespace.as_str())
            && rule.metadata.name.as_deref() == Some(self.name.as_str())
    }
}

impl fmt::Display for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
