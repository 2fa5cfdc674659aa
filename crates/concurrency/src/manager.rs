//! Transaction manager for coordinating commit operations
//!
//! Provides atomic commit by orchestrating:
//! 1. Validation (first-committer-wins)
//! 2. Value log append (durability)
//! 3. Store application (visibility)
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. mark_validating()       - Active → Validating
//! 2. lock the value log      - serializes every commit
//! 3. validate_transaction()  - IF conflicts: abort and return error
//! 4. allocate commit version - store version + 1
//! 5. append CommitRecord     - DURABILITY POINT (fsync if configured)
//! 6. apply to the store      - publishes the version
//! 7. mark_committed()
//! ```
//!
//! A crash before step 5 loses the transaction; after step 5 recovery
//! replays it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cairn_durability::{CommitRecord, LogOp, ValueLog};
use cairn_storage::{OrderedStore, StorageError, WriteOp};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::batch::WriteBatch;
use crate::transaction::{CommitError, TransactionContext, TxnLimits};
use crate::validation::validate_transaction;

/// Manages transaction lifecycle and atomic commits
///
/// The value log mutex doubles as the commit lock: holding it means no other
/// commit can validate, allocate a version or append.
pub struct TransactionManager {
    store: Arc<OrderedStore>,
    log: Mutex<ValueLog>,
    limits: TxnLimits,
    next_txn_id: AtomicU64,
}

impl TransactionManager {
    /// Manager over a recovered store and its open value log
    pub fn new(store: Arc<OrderedStore>, log: ValueLog, limits: TxnLimits) -> Self {
        TransactionManager {
            store,
            log: Mutex::new(log),
            limits,
            next_txn_id: AtomicU64::new(1),
        }
    }

    /// Start a transaction on a fresh snapshot
    pub fn begin(&self, read_only: bool) -> Result<TransactionContext, StorageError> {
        if self.store.is_closed() {
            return Err(StorageError::Closed);
        }
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.store.snapshot();
        debug!(target: "cairn::txn", txn_id, version = snapshot.version(), read_only, "Transaction started");
        Ok(TransactionContext::new(txn_id, snapshot, read_only, self.limits))
    }

    /// Commit a transaction atomically
    ///
    /// Returns the commit version, or the snapshot version when there was
    /// nothing to write. On conflict the transaction is aborted.
    pub fn commit(&self, txn: &mut TransactionContext) -> Result<u64, CommitError> {
        txn.mark_validating()?;

        if !txn.has_pending_writes() {
            txn.mark_committed();
            return Ok(txn.start_version());
        }

        let mut log = self.log.lock();

        let validation = match validate_transaction(txn, &self.store) {
            Ok(validation) => validation,
            Err(e) => {
                txn.mark_aborted(e.to_string());
                return Err(e.into());
            }
        };
        if !validation.is_valid() {
            txn.mark_aborted(format!(
                "commit failed: {} conflict(s) detected",
                validation.conflict_count()
            ));
            debug!(target: "cairn::txn", txn_id = txn.txn_id, conflicts = validation.conflict_count(), "Transaction conflict");
            return Err(CommitError::Conflict(validation));
        }

        let ops = txn.take_write_ops();
        match self.append_and_apply(&mut log, ops) {
            Ok(version) => {
                txn.mark_committed();
                debug!(target: "cairn::txn", txn_id = txn.txn_id, version, "Transaction committed");
                Ok(version)
            }
            Err(e) => {
                txn.mark_aborted(e.to_string());
                Err(e)
            }
        }
    }

    /// Apply a batch atomically, without validation or size limits
    pub fn write_batch(&self, batch: WriteBatch) -> Result<u64, CommitError> {
        if batch.is_empty() {
            return Ok(self.store.version());
        }
        let mut log = self.log.lock();
        self.append_and_apply(&mut log, batch.into_ops())
    }

    /// Append `ops` at the next version and apply them
    ///
    /// Callers hold the log lock.
    fn append_and_apply(&self, log: &mut ValueLog, ops: Vec<WriteOp>) -> Result<u64, CommitError> {
        if self.store.is_closed() {
            return Err(StorageError::Closed.into());
        }
        let version = self.store.version() + 1;
        let record = CommitRecord::new(version, ops.iter().map(to_log_op).collect());
        log.append(&record)?;

        // DURABILITY POINT: the log is authoritative from here on
        if let Err(e) = self.store.apply(ops, version) {
            error!(
                target: "cairn::txn",
                version,
                error = %e,
                "Store application failed after value log append - will be recovered on restart"
            );
        }
        Ok(version)
    }

    /// Run `f` with exclusive access to the value log
    ///
    /// Commits wait until `f` returns.
    pub fn with_log<R>(&self, f: impl FnOnce(&mut ValueLog, &OrderedStore) -> R) -> R {
        let mut log = self.log.lock();
        f(&mut log, &self.store)
    }

    /// The shared store
    pub fn store(&self) -> &Arc<OrderedStore> {
        &self.store
    }

    /// Highest published commit version
    pub fn current_version(&self) -> u64 {
        self.store.version()
    }

    /// Per-transaction size limits
    pub fn limits(&self) -> TxnLimits {
        self.limits
    }
}

/// Log form of a store operation
pub fn to_log_op(op: &WriteOp) -> LogOp {
    match op {
        WriteOp::Put {
            key,
            value,
            expires_at,
        } => LogOp::Put {
            key: key.clone(),
            value: value.to_vec(),
            expires_at: *expires_at,
        },
        WriteOp::Delete { key } => LogOp::Delete { key: key.clone() },
    }
}

/// Store form of a logged operation
pub fn from_log_op(op: LogOp) -> WriteOp {
    match op {
        LogOp::Put {
            key,
            value,
            expires_at,
        } => WriteOp::Put {
            key,
            value: Arc::from(value),
            expires_at,
        },
        LogOp::Delete { key } => WriteOp::Delete { key },
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("version", &self.current_version())
            .field("limits", &self.limits)
            .finish()
    }
}
