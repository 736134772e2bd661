//! # Rule Matcher
//!
//! Decides whether an artifact is a replication source under a rule.
//! Exact string comparison only, no wildcards.

use crate::constants::SELECTOR_LABEL_KEY;
use crate::controller::artifact::Artifact;
use crate::crd::ConfigurationDistributionRule;

/// Result of evaluating one artifact against one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched,
    /// The rule mode does not cover the artifact kind
    KindExcluded,
    /// The artifact does not live in the rule's namespace
    ForeignNamespace,
    /// The `rule` label differs from the rule selector
    SelectorMismatch,
}

impl MatchOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MatchOutcome::Matched => "matched",
            MatchOutcome::KindExcluded => "kind-excluded",
            MatchOutcome::ForeignNamespace => "foreign-namespace",
            MatchOutcome::SelectorMismatch => "selector-mismatch",
        }
    }
}

/// Evaluate the kind, origin and selector checks in that order
#[must_use]
pub fn explain(artifact: &Artifact, rule: &ConfigurationDistributionRule) -> MatchOutcome {
    if !rule.spec.mode.covers(artifact.kind()) {
        return MatchOutcome::KindExcluded;
    }

    match (artifact.namespace(), rule.home_namespace()) {
        (Some(origin), Some(home)) if origin == home => {}
        _ => return MatchOutcome::ForeignNamespace,
    }

    if let Some(selector) = rule.selector() {
        if artifact.label(SELECTOR_LABEL_KEY) != Some(selector) {
            return MatchOutcome::SelectorMismatch;
        }
    }

    MatchOutcome::Matched
}

/// Whether `artifact` is eligible for replication under `rule`
#[must_use]
pub fn matches(artifact: &Artifact, rule: &ConfigurationDistributionRule) -> bool {
    explain(artifact, rule) == MatchOutcome::Matched
}
