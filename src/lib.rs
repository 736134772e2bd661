//! Configuration Distributor Library
//!
//! Replicates ConfigMaps and Secrets from a rule's home namespace into the
//! target namespaces named by a `ConfigurationDistributionRule`.
//!
//! ## Quick Start
//!
//! ```rust
//! use config_distributor::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
