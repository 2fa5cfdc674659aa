//! MVCC version chains
//!
//! Versions are stored in descending order (newest first) for efficient
//! snapshot reads: we typically want the most recent version <= the
//! snapshot version.
//!
//! # Performance
//!
//! Uses VecDeque for O(1) push_front. Workloads that rewrite the same key
//! (SetTTL, counters) grow chains at the front only.

use std::collections::VecDeque;

use crate::stored_value::StoredValue;

/// Version chain for one key
#[derive(Debug, Clone)]
pub struct VersionChain {
    /// Versions newest-first
    versions: VecDeque<StoredValue>,
}

impl VersionChain {
    /// Create a chain with a single version
    pub fn new(value: StoredValue) -> Self {
        let mut versions = VecDeque::with_capacity(2);
        versions.push_front(value);
        Self { versions }
    }

    /// Add a new version
    ///
    /// Commits are serialized, so `value` is always newer than the head.
    #[inline]
    pub fn push(&mut self, value: StoredValue) {
        debug_assert!(
            self.latest().map_or(true, |head| head.version() < value.version()),
            "version chain must grow newest-first"
        );
        self.versions.push_front(value);
    }

    /// Install a version read back from the log during recovery
    ///
    /// Recovery keeps only the newest version of each key. At equal versions a
    /// tombstone wins, since reclamation rewrites expired values as tombstones
    /// carrying their original version. Returns whether the chain changed.
    pub fn recover(&mut self, value: StoredValue) -> bool {
        let replace = match self.latest() {
            None => true,
            Some(head) if value.version() > head.version() => true,
            Some(head) => {
                value.version() == head.version() && value.is_tombstone() && !head.is_tombstone()
            }
        };
        if replace {
            self.versions.clear();
            self.versions.push_front(value);
        }
        replace
    }

    /// The newest version at or below `max_version`
    pub fn get_at_version(&self, max_version: u64) -> Option<&StoredValue> {
        self.versions.iter().find(|sv| sv.version() <= max_version)
    }

    /// The newest version
    #[inline]
    pub fn latest(&self) -> Option<&StoredValue> {
        self.versions.front()
    }

    /// Drop versions no snapshot at or above `min_version` can see
    ///
    /// Keeps every version newer than `min_version` plus the newest version at
    /// or below it. Returns the number of versions removed.
    pub fn prune(&mut self, min_version: u64) -> usize {
        let keep = match self
            .versions
            .iter()
            .position(|sv| sv.version() <= min_version)
        {
            Some(idx) => idx + 1,
            None => return 0,
        };
        let removed = self.versions.len().saturating_sub(keep);
        self.versions.truncate(keep);
        removed
    }

    /// Replace an expired head value with a tombstone of the same version
    ///
    /// Expiry is wall-clock based, so the value is already invisible to every
    /// reader. Returns whether the head was buried.
    pub fn expire_head(&mut self, now: u64) -> bool {
        match self.versions.front_mut() {
            Some(head) if !head.is_tombstone() && head.is_expired_at(now) => {
                head.bury();
                true
            }
            _ => false,
        }
    }

    /// Whether the chain is a lone tombstone that no snapshot needs
    pub fn is_removable(&self, min_version: u64) -> bool {
        self.versions.len() == 1
            && self
                .latest()
                .map_or(true, |head| head.is_tombstone() && head.version() <= min_version)
    }

    /// Number of versions stored
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Whether the chain holds no versions
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
