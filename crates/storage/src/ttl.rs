//! TTL (Time-To-Live) index for expiration cleanup
//!
//! Maps expiry second -> keys, so pruning finds expired keys in
//! O(expired count) instead of scanning the whole keyspace.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;

/// TTL index: expiry second -> raw keys
#[derive(Debug, Default)]
pub struct TtlIndex {
    index: BTreeMap<u64, FxHashSet<Vec<u8>>>,
}

impl TtlIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `key` expires at `expires_at`
    pub fn insert(&mut self, expires_at: u64, key: Vec<u8>) {
        self.index.entry(expires_at).or_default().insert(key);
    }

    /// Forget `key` at `expires_at`
    ///
    /// Used when a key is deleted or overwritten. Empty buckets are dropped.
    pub fn remove(&mut self, expires_at: u64, key: &[u8]) {
        if let Some(keys) = self.index.get_mut(&expires_at) {
            keys.remove(key);
            if keys.is_empty() {
                self.index.remove(&expires_at);
            }
        }
    }

    /// Remove and return every key expiring at or before `now`
    pub fn drain_expired(&mut self, now: u64) -> Vec<Vec<u8>> {
        let expired: Vec<u64> = self.index.range(..=now).map(|(ts, _)| *ts).collect();
        let mut keys = Vec::new();
        for ts in expired {
            if let Some(bucket) = self.index.remove(&ts) {
                keys.extend(bucket);
            }
        }
        keys
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Total number of keys tracked
    pub fn len(&self) -> usize {
        self.index.values().map(|keys| keys.len()).sum()
    }
}
