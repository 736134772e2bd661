//! # Controller
//!
//! Core distribution modules.
//!
//! - `artifact`: ConfigMap/Secret abstraction and replica construction
//! - `client`: Kubernetes API seams (artifact and rule access)
//! - `dispatcher`: event routing and the `Distributor` engine
//! - `matcher`: source eligibility under a rule
//! - `replicator`: idempotent create-or-update fan-out
//! - `resync`: enumerate-and-replicate passes
//! - `rule_store`: atomically swappable active rule
//! - `types`: shared enums and errors

pub mod artifact;
pub mod client;
pub mod dispatcher;
pub mod matcher;
pub mod replicator;
pub mod resync;
pub mod rule_store;
pub mod types;
