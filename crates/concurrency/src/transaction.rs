//! Transaction context for OCC
//!
//! TransactionContext tracks the reads and buffered writes of one
//! transaction against a pinned snapshot, enabling validation at commit
//! time.
//!
//! - Reads see the snapshot plus the transaction's own pending writes.
//! - Every key read from the snapshot records the live version observed;
//!   commit fails if any of those versions changed.
//! - Blind writes never conflict.
//! - Pending writes are last-write-wins per key and bounded by
//!   [`TxnLimits`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use cairn_durability::DurabilityError;
use cairn_storage::{
    now_secs, CursorOptions, Snapshot, StorageError, StoredValue, WriteOp,
};
use rustc_hash::FxHashMap;

use crate::iterator::TransactionIterator;
use crate::validation::ValidationResult;

/// Fixed per-entry cost counted against `max_bytes`
pub const ENTRY_OVERHEAD: usize = 16;

/// Per-transaction size limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnLimits {
    /// Maximum number of pending operations
    pub max_ops: usize,
    /// Maximum pending bytes (key + value + [`ENTRY_OVERHEAD`] per entry)
    pub max_bytes: usize,
}

impl Default for TxnLimits {
    fn default() -> Self {
        TxnLimits {
            max_ops: 100_000,
            max_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Errors from transaction operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxnError {
    /// Transaction was already committed or discarded
    #[error("transaction is not active")]
    NotActive,

    /// Write attempted in a read-only transaction
    #[error("transaction is read-only")]
    ReadOnly,

    /// The write would exceed the transaction size limits
    #[error("transaction too big: {ops} ops, {bytes} bytes")]
    TooBig {
        /// Pending operations the write would produce
        ops: usize,
        /// Pending bytes the write would produce
        bytes: usize,
    },

    /// Underlying store failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Error type for commit failures
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// Transaction aborted due to read-write conflicts
    #[error("commit failed: {} conflict(s)", .0.conflict_count())]
    Conflict(ValidationResult),

    /// Transaction was not in a committable state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The value log write failed; nothing was applied
    #[error("value log: {0}")]
    Log(#[from] DurabilityError),

    /// The store refused the commit
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Active` → `Validating` (begin commit)
/// - `Validating` → `Committed` (validation passed, log written)
/// - `Validating` → `Aborted` (conflict or log failure)
/// - `Active` → `Aborted` (discard)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting reads and writes
    Active,
    /// Commit in progress
    Validating,
    /// Writes are durable and visible
    Committed,
    /// Writes were dropped
    Aborted {
        /// Why the transaction ended
        reason: String,
    },
}

/// A buffered write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    /// Value write
    Put {
        /// Value bytes
        value: Arc<[u8]>,
        /// Absolute expiration (unix seconds)
        expires_at: Option<u64>,
    },
    /// Tombstone
    Delete,
}

impl PendingWrite {
    fn cost(&self, key: &[u8]) -> usize {
        let value_len = match self {
            PendingWrite::Put { value, .. } => value.len(),
            PendingWrite::Delete => 0,
        };
        key.len() + value_len + ENTRY_OVERHEAD
    }

    fn into_write_op(self, key: Vec<u8>) -> WriteOp {
        match self {
            PendingWrite::Put { value, expires_at } => WriteOp::Put {
                key,
                value,
                expires_at,
            },
            PendingWrite::Delete => WriteOp::Delete { key },
        }
    }
}

/// Read/write state of one transaction
pub struct TransactionContext {
    /// Transaction id (diagnostics only)
    pub txn_id: u64,
    snapshot: Snapshot,
    read_only: bool,
    /// Key -> live version observed at first read (0 = absent)
    read_set: FxHashMap<Vec<u8>, u64>,
    pending: BTreeMap<Vec<u8>, PendingWrite>,
    pending_bytes: usize,
    limits: TxnLimits,
    status: TransactionStatus,
}

impl TransactionContext {
    /// Start a transaction on `snapshot`
    pub fn new(txn_id: u64, snapshot: Snapshot, read_only: bool, limits: TxnLimits) -> Self {
        TransactionContext {
            txn_id,
            snapshot,
            read_only,
            read_set: FxHashMap::default(),
            pending: BTreeMap::new(),
            pending_bytes: 0,
            limits,
            status: TransactionStatus::Active,
        }
    }

    /// Snapshot version the transaction reads at
    pub fn start_version(&self) -> u64 {
        self.snapshot.version()
    }

    /// Snapshot the transaction reads from
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Value visible to this transaction
    ///
    /// Pending writes win over the snapshot; a pending put reads back with
    /// version 0 since it has no commit version yet. Tombstones and values
    /// expired now read as `None`.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<StoredValue>, TxnError> {
        self.ensure_active()?;
        let now = now_secs();

        if let Some(write) = self.pending.get(key) {
            return Ok(match write {
                PendingWrite::Put { value, expires_at } => {
                    let sv = StoredValue::put(Arc::clone(value), 0, *expires_at);
                    sv.is_live_at(now).then_some(sv)
                }
                PendingWrite::Delete => None,
            });
        }

        let visible = self.snapshot.get(key)?;
        let observed = match &visible {
            Some(sv) if !sv.is_tombstone() => sv.version(),
            _ => 0,
        };
        self.read_set.entry(key.to_vec()).or_insert(observed);
        Ok(visible.filter(|sv| sv.is_live_at(now)))
    }

    /// Iterate keys under a prefix, merging pending writes into the snapshot
    ///
    /// The iterator owns a clone of the snapshot and of the matching pending
    /// writes, so it stays valid after the transaction ends.
    pub fn iter(&self, options: CursorOptions) -> Result<TransactionIterator, TxnError> {
        self.ensure_active()?;
        let pending = self
            .pending
            .range::<[u8], _>((
                std::ops::Bound::Included(options.prefix.as_slice()),
                std::ops::Bound::Unbounded,
            ))
            .take_while(|(k, _)| k.starts_with(&options.prefix))
            .map(|(k, w)| (k.clone(), w.clone()))
            .collect();
        Ok(TransactionIterator::new(
            self.snapshot.cursor(options.clone()),
            pending,
            &options,
        ))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Buffer a value write
    pub fn put(
        &mut self,
        key: Vec<u8>,
        value: Arc<[u8]>,
        expires_at: Option<u64>,
    ) -> Result<(), TxnError> {
        self.buffer(key, PendingWrite::Put { value, expires_at })
    }

    /// Buffer a tombstone
    pub fn delete(&mut self, key: Vec<u8>) -> Result<(), TxnError> {
        self.buffer(key, PendingWrite::Delete)
    }

    fn buffer(&mut self, key: Vec<u8>, write: PendingWrite) -> Result<(), TxnError> {
        self.ensure_active()?;
        if self.read_only {
            return Err(TxnError::ReadOnly);
        }

        let replaced = self.pending.get(&key).map_or(0, |old| old.cost(&key));
        let ops = self.pending.len() + usize::from(replaced == 0);
        let bytes = self.pending_bytes - replaced + write.cost(&key);
        if ops > self.limits.max_ops || bytes > self.limits.max_bytes {
            return Err(TxnError::TooBig { ops, bytes });
        }

        self.pending.insert(key, write);
        self.pending_bytes = bytes;
        Ok(())
    }

    // ========================================================================
    // Commit support
    // ========================================================================

    /// Keys read and the live versions observed
    pub fn read_set(&self) -> &FxHashMap<Vec<u8>, u64> {
        &self.read_set
    }

    /// Buffered writes, ordered by key
    pub fn pending(&self) -> &BTreeMap<Vec<u8>, PendingWrite> {
        &self.pending
    }

    /// Move the buffered writes out as store operations
    pub fn take_write_ops(&mut self) -> Vec<WriteOp> {
        self.pending_bytes = 0;
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(key, write)| write.into_write_op(key))
            .collect()
    }

    /// Whether there are buffered writes
    pub fn has_pending_writes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of buffered writes
    pub fn write_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of keys read
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    /// Bytes counted against the size limit
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Whether writes are rejected
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Whether reads and writes are accepted
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Whether the transaction committed
    pub fn is_committed(&self) -> bool {
        self.status == TransactionStatus::Committed
    }

    /// Error unless the transaction is active
    pub fn ensure_active(&self) -> Result<(), TxnError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(TxnError::NotActive)
        }
    }

    /// Active → Validating
    pub fn mark_validating(&mut self) -> Result<(), CommitError> {
        if !self.is_active() {
            return Err(CommitError::InvalidState(format!(
                "cannot commit transaction {} from {:?} state",
                self.txn_id, self.status
            )));
        }
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    /// Validating → Committed
    pub fn mark_committed(&mut self) {
        self.status = TransactionStatus::Committed;
    }

    /// Any non-terminal state → Aborted
    pub fn mark_aborted(&mut self, reason: impl Into<String>) {
        self.pending.clear();
        self.pending_bytes = 0;
        self.status = TransactionStatus::Aborted {
            reason: reason.into(),
        };
    }

    /// Drop every buffered write; a no-op once the transaction has ended
    pub fn discard(&mut self) {
        if self.is_active() {
            self.mark_aborted("discarded");
        }
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txn_id", &self.txn_id)
            .field("start_version", &self.start_version())
            .field("read_only", &self.read_only)
            .field("reads", &self.read_set.len())
            .field("writes", &self.pending.len())
            .field("status", &self.status)
            .finish()
    }
}
