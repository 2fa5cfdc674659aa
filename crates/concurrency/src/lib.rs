//! Concurrency layer for cairn
//!
//! This crate implements optimistic concurrency control (OCC) with:
//! - TransactionContext: read set and buffered writes over a snapshot
//! - Snapshot isolation with read-your-own-writes
//! - Conflict detection at commit time (first committer wins)
//! - Per-transaction size limits
//! - Native write batches that bypass validation
//! - Iterators that merge pending writes into snapshot cursors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod iterator;
pub mod manager;
pub mod transaction;
pub mod validation;

pub use batch::WriteBatch;
pub use iterator::TransactionIterator;
pub use manager::{from_log_op, to_log_op, TransactionManager};
pub use transaction::{
    CommitError, PendingWrite, TransactionContext, TransactionStatus, TxnError, TxnLimits,
    ENTRY_OVERHEAD,
};
pub use validation::{validate_transaction, ConflictType, ValidationResult};
