//! Atomic write batches
//!
//! A [`Batch`] only records operations; the engine is not touched until
//! [`commit`](Batch::commit). With native batching the operations go to the
//! engine's write batch, which has no per-transaction size limit. Without
//! it they are replayed, in the order they were queued, into one fresh
//! read-write transaction. Either way the commit is all or nothing.

use std::sync::Arc;

use cairn_core::datastore as traits;
use cairn_core::{Error, Key, Result};
use cairn_engine::{Engine, WriteBatch};
use tracing::debug;

use crate::error::from_engine;

#[derive(Debug, Clone)]
enum PendingOp {
    Put { key: Vec<u8>, value: Arc<[u8]> },
    Delete { key: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchState {
    Open,
    Committed,
    Cancelled,
}

/// Group of puts and deletes applied atomically
#[derive(Debug)]
pub struct Batch {
    engine: Arc<Engine>,
    native: bool,
    ops: Vec<PendingOp>,
    state: BatchState,
}

impl Batch {
    pub(crate) fn new(engine: Arc<Engine>, native: bool) -> Self {
        Batch {
            engine,
            native,
            ops: Vec::new(),
            state: BatchState::Open,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            BatchState::Open => Ok(()),
            _ => Err(Error::TransactionClosed),
        }
    }

    /// Queue a write; a later operation on the same key wins
    pub fn put(&mut self, key: &Key, value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.ops.push(PendingOp::Put {
            key: key.as_bytes().to_vec(),
            value: Arc::from(value),
        });
        Ok(())
    }

    /// Queue a delete
    pub fn delete(&mut self, key: &Key) -> Result<()> {
        self.ensure_open()?;
        self.ops.push(PendingOp::Delete {
            key: key.as_bytes().to_vec(),
        });
        Ok(())
    }

    /// Number of queued operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every queued operation
    ///
    /// On failure nothing was applied and the batch stays open, so it can be
    /// committed again or cancelled.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.native {
            self.commit_native()?;
        } else {
            self.commit_with_transaction()?;
        }
        debug!(target: "cairn::txn", ops = self.ops.len(), native = self.native, "Batch committed");
        self.ops.clear();
        self.state = BatchState::Committed;
        Ok(())
    }

    fn commit_native(&self) -> Result<()> {
        let mut batch = WriteBatch::new();
        for op in &self.ops {
            match op {
                PendingOp::Put { key, value } => batch.put(key.clone(), Arc::clone(value), None),
                PendingOp::Delete { key } => batch.delete(key.clone()),
            }
        }
        self.engine.write_batch(batch).map_err(from_engine)?;
        Ok(())
    }

    fn commit_with_transaction(&self) -> Result<()> {
        // dropping txn on an early return discards it
        let mut txn = self.engine.begin(false).map_err(from_engine)?;
        for op in &self.ops {
            let queued = match op {
                PendingOp::Put { key, value } => txn.set(key, Arc::clone(value)),
                PendingOp::Delete { key } => txn.delete(key),
            };
            queued.map_err(from_engine)?;
        }
        txn.commit().map_err(from_engine)?;
        Ok(())
    }

    /// Drop every queued operation
    ///
    /// Cancelling twice, or after a commit, does nothing.
    pub fn cancel(&mut self) -> Result<()> {
        if self.state == BatchState::Open {
            self.ops.clear();
            self.state = BatchState::Cancelled;
        }
        Ok(())
    }
}

impl traits::Batch for Batch {
    fn put(&mut self, key: &Key, value: &[u8]) -> Result<()> {
        Batch::put(self, key, value)
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        Batch::delete(self, key)
    }

    fn commit(&mut self) -> Result<()> {
        Batch::commit(self)
    }

    fn cancel(&mut self) -> Result<()> {
        Batch::cancel(self)
    }
}
