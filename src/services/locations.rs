//! Aisle-location recorder
//!
//! Maps each found item to the aisle where it was first confirmed.
//! First write wins: duplicate detections of the same physical item,
//! including from concurrent polls, never move an entry.

use crate::domain::types::{Aisle, FoundItem, SearchSummary};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

#[derive(Default)]
struct Inner {
    by_item: FxHashMap<String, Aisle>,
    /// Order of first recording, for the summary
    order: Vec<String>,
}

#[derive(Default)]
pub struct AisleLocationRecorder {
    inner: Mutex<Inner>,
}

impl AisleLocationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the aisle for an item unless one is already recorded.
    /// Returns true if this call created the entry.
    pub fn record_if_absent(&self, item: &str, aisle: Aisle) -> bool {
        let mut inner = self.inner.lock();
        if inner.by_item.contains_key(item) {
            return false;
        }
        inner.by_item.insert(item.to_string(), aisle);
        inner.order.push(item.to_string());
        true
    }

    pub fn aisle_of(&self, item: &str) -> Option<Aisle> {
        self.inner.lock().by_item.get(item).copied()
    }

    /// The full mapping, in the order items were found
    pub fn summary(&self) -> SearchSummary {
        let inner = self.inner.lock();
        let entries = inner
            .order
            .iter()
            .map(|item| FoundItem { item: item.clone(), aisle: inner.by_item[item] })
            .collect();
        SearchSummary { entries }
    }

    /// Reset for a new run
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_item.clear();
        inner.order.clear();
    }
}
