//! Native write batches
//!
//! A `WriteBatch` collects puts and deletes with no snapshot, no read set and
//! no size limit. Committing it writes one log record and applies every
//! operation at one version. Later operations on a key replace earlier ones.

use std::collections::BTreeMap;
use std::sync::Arc;

use cairn_storage::WriteOp;

use crate::transaction::PendingWrite;

/// Collapsed set of pending writes
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: BTreeMap<Vec<u8>, PendingWrite>,
}

impl WriteBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a value write
    pub fn put(&mut self, key: Vec<u8>, value: Arc<[u8]>, expires_at: Option<u64>) {
        self.ops.insert(key, PendingWrite::Put { value, expires_at });
    }

    /// Queue a tombstone
    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.insert(key, PendingWrite::Delete);
    }

    /// Number of distinct keys touched
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Store operations in key order
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
            .into_iter()
            .map(|(key, write)| match write {
                PendingWrite::Put { value, expires_at } => WriteOp::Put {
                    key,
                    value,
                    expires_at,
                },
                PendingWrite::Delete => WriteOp::Delete { key },
            })
            .collect()
    }
}
