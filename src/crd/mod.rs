//! # Custom Resource Definitions
//!
//! CRD types for the configuration distributor.
//!
//! - `rule.rs` - `ConfigurationDistributionRule` and its pinned identity

mod rule;

pub use rule::{
    ConfigurationDistributionRule, ConfigurationDistributionRuleSpec, DistributionMode, RuleRef,
};
