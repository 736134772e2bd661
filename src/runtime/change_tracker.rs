//! # Change Tracker
//!
//! Turns raw watcher events into added/modified/deleted notifications.
//!
//! The watcher reports every object it lists or sees as an apply; the tracker
//! remembers which keys it has already handed out so the first sighting becomes
//! `Added` and later ones `Modified`. A deletion forgets the key, so a
//! re-created object is `Added` again.

use crate::controller::types::ChangeType;
use kube::{Resource, ResourceExt};
use kube_runtime::watcher;
use std::collections::HashSet;

/// Per-stream memory of observed object keys
#[derive(Debug, Default)]
pub struct ChangeTracker {
    seen: HashSet<String>,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one watcher event; list boundaries produce nothing
    pub fn observe<K: Resource>(&mut self, event: watcher::Event<K>) -> Option<(ChangeType, K)> {
        match event {
            watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
                let change = if self.seen.insert(object_key(&obj)) {
                    ChangeType::Added
                } else {
                    ChangeType::Modified
                };
                Some((change, obj))
            }
            watcher::Event::Delete(obj) => {
                self.seen.remove(&object_key(&obj));
                Some((ChangeType::Deleted, obj))
            }
            watcher::Event::Init | watcher::Event::InitDone => None,
        }
    }

    /// Number of keys currently known
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

fn object_key<K: Resource>(obj: &K) -> String {
    match obj.namespace() {
        Some(namespace) => format!("{namespace}/{}", obj.name_any()),
        None => obj.name_any(),
    }
}
