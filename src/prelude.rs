//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use config_distributor::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Client seams - needed for alternative backends and tests
pub use crate::controller::client::{ArtifactClient, ClientError, RuleClient};

// Engine
pub use crate::controller::artifact::{Artifact, ArtifactKind};
pub use crate::controller::dispatcher::{DispatchEvent, DispatchOutcome, Distributor, IgnoreReason};
pub use crate::controller::matcher::{explain, matches, MatchOutcome};
pub use crate::controller::replicator::{ReplicaOutcome, ReplicationReport, Replicator};
pub use crate::controller::resync::{Resync, ResyncReport};
pub use crate::controller::rule_store::RuleStore;
pub use crate::controller::types::{ChangeType, DistributorError, EngineState, ResourceClass};

// Config types
pub use crate::config::{ControllerConfig, LogFormat};
