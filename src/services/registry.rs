//! Wanted-item registry
//!
//! The mutable list of items still being searched for. The UI adds and
//! removes entries while the detection loop auto-removes found ones, so
//! every mutation goes through one mutex. Insertion order is preserved
//! for display; membership checks go through a hash set.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

/// Result of an add: duplicates are a signal for the UI, not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Duplicate,
}

/// Result of a remove: removing an absent item is a signal, not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

#[derive(Default)]
struct Inner {
    /// Display order (insertion order)
    order: Vec<String>,
    /// O(1) membership
    members: FxHashSet<String>,
}

#[derive(Default)]
pub struct WantedItemRegistry {
    inner: Mutex<Inner>,
}

impl WantedItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item, preserving insertion order. Duplicates are refused.
    pub fn add(&self, item: &str) -> AddOutcome {
        let mut inner = self.inner.lock();
        if !inner.members.insert(item.to_string()) {
            return AddOutcome::Duplicate;
        }
        inner.order.push(item.to_string());
        AddOutcome::Added
    }

    /// Remove an item. Exactly one concurrent caller can observe
    /// `Removed` for a given member; everyone else sees `NotFound`.
    pub fn remove(&self, item: &str) -> RemoveOutcome {
        let mut inner = self.inner.lock();
        if !inner.members.remove(item) {
            return RemoveOutcome::NotFound;
        }
        inner.order.retain(|member| member != item);
        RemoveOutcome::Removed
    }

    pub fn contains(&self, item: &str) -> bool {
        self.inner.lock().members.contains(item)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    /// Immutable copy of the current members, in insertion order.
    /// Never exposes a partially-updated view.
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().order.clone()
    }

    /// Empty the registry (the registry itself persists across searches)
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.order.clear();
        inner.members.clear();
    }
}
