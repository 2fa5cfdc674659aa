//! Datastore interfaces
//!
//! Store-level operations take `&self`: a datastore is shared across threads.
//! Transactions and batches take `&mut self`: each one belongs to a single
//! caller at a time.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::key::Key;
use crate::query::{Query, Results};

/// Key-value store with queries
pub trait Datastore: Send + Sync {
    /// Value stored under `key`; [`Error::NotFound`](crate::Error::NotFound) if absent
    fn get(&self, key: &Key) -> Result<Vec<u8>>;

    /// Whether `key` exists; absence is not an error
    fn has(&self, key: &Key) -> Result<bool>;

    /// Length of the value under `key`; [`Error::NotFound`](crate::Error::NotFound) if absent
    fn get_size(&self, key: &Key) -> Result<usize>;

    /// Store `value` under `key`
    fn put(&self, key: &Key, value: &[u8]) -> Result<()>;

    /// Remove `key`; removing an absent key succeeds
    fn delete(&self, key: &Key) -> Result<()>;

    /// Run a query; results are produced lazily
    fn query(&self, query: Query) -> Result<Results>;

    /// Flush writes under `prefix` to stable storage
    fn sync(&self, prefix: &Key) -> Result<()>;
}

/// Group of writes applied atomically on commit
pub trait Batch: Send {
    /// Queue a write; a later operation on the same key supersedes it
    fn put(&mut self, key: &Key, value: &[u8]) -> Result<()>;

    /// Queue a delete
    fn delete(&mut self, key: &Key) -> Result<()>;

    /// Apply every queued operation, all or nothing
    fn commit(&mut self) -> Result<()>;

    /// Drop every queued operation
    fn cancel(&mut self) -> Result<()>;
}

/// Datastore that can hand out batches
pub trait Batching: Datastore {
    /// Batch type
    type Batch: Batch;

    /// Start a new batch
    fn batch(&self) -> Result<Self::Batch>;
}

/// Multi-operation transaction with snapshot isolation
pub trait Txn: Send {
    /// Value stored under `key` in this transaction's view
    fn get(&mut self, key: &Key) -> Result<Vec<u8>>;

    /// Whether `key` exists in this transaction's view
    fn has(&mut self, key: &Key) -> Result<bool>;

    /// Length of the value under `key` in this transaction's view
    fn get_size(&mut self, key: &Key) -> Result<usize>;

    /// Buffer a write
    fn put(&mut self, key: &Key, value: &[u8]) -> Result<()>;

    /// Buffer a delete
    fn delete(&mut self, key: &Key) -> Result<()>;

    /// Query this transaction's view
    fn query(&mut self, query: Query) -> Result<Results>;

    /// Apply all buffered writes atomically
    fn commit(&mut self) -> Result<()>;

    /// Drop all buffered writes
    fn discard(&mut self);
}

/// Datastore that can hand out explicit transactions
pub trait TxnDatastore: Datastore {
    /// Transaction type
    type Txn: Txn;

    /// Start a transaction; read-only transactions reject writes
    fn new_transaction(&self, read_only: bool) -> Result<Self::Txn>;
}

/// Time-to-live operations on a datastore
pub trait TtlDatastore: Datastore {
    /// Store `value` under `key`, expiring after `ttl`
    fn put_with_ttl(&self, key: &Key, value: &[u8], ttl: Duration) -> Result<()>;

    /// Rewrite the current value of `key` with a new expiration
    fn set_ttl(&self, key: &Key, ttl: Duration) -> Result<()>;

    /// Absolute expiration of `key`
    fn get_expiration(&self, key: &Key) -> Result<DateTime<Utc>>;
}

/// Time-to-live operations inside a transaction
pub trait TxnTtl: Txn {
    /// Buffer a write expiring after `ttl`
    fn put_with_ttl(&mut self, key: &Key, value: &[u8], ttl: Duration) -> Result<()>;

    /// Rewrite the current value of `key` with a new expiration
    fn set_ttl(&mut self, key: &Key, ttl: Duration) -> Result<()>;

    /// Absolute expiration of `key`
    fn get_expiration(&mut self, key: &Key) -> Result<DateTime<Utc>>;
}

/// Datastore that can reclaim space on demand
pub trait GcDatastore: Datastore {
    /// Reclaim space held by overwritten, deleted and expired values
    fn collect_garbage(&self) -> Result<()>;
}

/// Datastore backed by files on disk
pub trait PersistentDatastore: Datastore {
    /// Approximate bytes used on disk
    fn disk_usage(&self) -> Result<u64>;
}
