//! Point-in-time views of the store
//!
//! A `Snapshot` pins a commit version. Writes committed after the snapshot was
//! taken stay invisible to it, and the store keeps every version the snapshot
//! can read until it is dropped.

use std::sync::Arc;

use crate::cursor::{Cursor, CursorOptions};
use crate::error::Result;
use crate::store::OrderedStore;
use crate::stored_value::StoredValue;

/// Read-only view of the store at one version
#[derive(Debug)]
pub struct Snapshot {
    store: Arc<OrderedStore>,
    version: u64,
}

impl Snapshot {
    pub(crate) fn new(store: Arc<OrderedStore>) -> Self {
        let version = store.register_snapshot();
        Snapshot { store, version }
    }

    /// Commit version this snapshot reads at
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Entry visible for `key`: a value, a tombstone, or `None`
    ///
    /// Expiry is not applied here; callers decide how an expired value reads.
    pub fn get(&self, key: &[u8]) -> Result<Option<StoredValue>> {
        self.store.get_at(key, self.version)
    }

    /// Open a cursor over the snapshot
    pub fn cursor(&self, options: CursorOptions) -> Cursor {
        Cursor::new(self.clone(), options)
    }

    pub(crate) fn store(&self) -> &OrderedStore {
        &self.store
    }
}

impl Clone for Snapshot {
    fn clone(&self) -> Self {
        self.store.retain_snapshot(self.version);
        Snapshot {
            store: Arc::clone(&self.store),
            version: self.version,
        }
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.store.release_snapshot(self.version);
    }
}
