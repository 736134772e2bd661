//! # Configuration
//!
//! Startup configuration for the distributor. Read once, never hot-reloaded.

mod controller;

pub use controller::{ControllerConfig, LogFormat};
