//! # Runtime
//!
//! Process-level plumbing around the distributor.
//!
//! - `change_tracker`: added/modified/deleted classification of watcher events
//! - `error_policy`: watch error classification and diagnostics
//! - `initialization`: startup sequence
//! - `watch_loop`: the four watch streams and their shared cancellation

pub mod change_tracker;
pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
