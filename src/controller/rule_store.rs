//! # Rule Store
//!
//! Holds the active distribution rule. This is the only state shared between
//! the watch loops; every reader gets a complete snapshot or nothing.

use crate::crd::ConfigurationDistributionRule;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::info;

/// Atomically swappable holder of the active rule
#[derive(Debug, Default)]
pub struct RuleStore {
    current: ArcSwapOption<ConfigurationDistributionRule>,
}

impl RuleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active rule as a whole, returning the previous one
    pub fn set(
        &self,
        rule: Option<ConfigurationDistributionRule>,
    ) -> Option<Arc<ConfigurationDistributionRule>> {
        let next = rule.map(Arc::new);
        let previous = self.current.swap(next.clone());

        match (&previous, &next) {
            (None, Some(rule)) => info!(
                rule.version = rule.version().unwrap_or("unknown"),
                rule.mode = rule.spec.mode.as_str(),
                rule.targets = rule.targets().len(),
                "rule.activated"
            ),
            (Some(_), Some(rule)) => info!(
                rule.version = rule.version().unwrap_or("unknown"),
                rule.mode = rule.spec.mode.as_str(),
                rule.targets = rule.targets().len(),
                "rule.updated"
            ),
            (Some(_), None) => info!("rule.cleared"),
            (None, None) => {}
        }

        previous
    }

    /// Snapshot of the active rule
    #[must_use]
    pub fn get(&self) -> Option<Arc<ConfigurationDistributionRule>> {
        self.current.load_full()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current.load().is_some()
    }
}
