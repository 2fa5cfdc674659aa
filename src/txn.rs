//! Datastore transactions
//!
//! A [`Transaction`] wraps one engine transaction. Reads see the snapshot
//! taken when it started plus its own buffered writes; nothing is visible to
//! anyone else until [`commit`](Transaction::commit). Dropping an
//! uncommitted transaction discards it.

use std::sync::Arc;
use std::time::Duration;

use cairn_core::datastore as traits;
use cairn_core::{Error, Key, Query, Result, Results};
use cairn_engine::{EngineError, EngineTxn, Item};
use chrono::{DateTime, TimeZone, Utc};

use crate::error::from_engine;
use crate::query;

/// Explicit multi-operation transaction
#[derive(Debug)]
pub struct Transaction {
    txn: EngineTxn,
    query_buffer: usize,
}

impl Transaction {
    pub(crate) fn new(txn: EngineTxn, query_buffer: usize) -> Self {
        Transaction { txn, query_buffer }
    }

    fn item(&mut self, key: &Key) -> Result<Item> {
        self.txn.get(key.as_bytes()).map_err(from_engine)
    }

    /// Value stored under `key`
    pub fn get(&mut self, key: &Key) -> Result<Vec<u8>> {
        let item = self.item(key)?;
        Ok(item.value().map(<[u8]>::to_vec).unwrap_or_default())
    }

    /// Whether `key` exists
    pub fn has(&mut self, key: &Key) -> Result<bool> {
        match self.txn.get(key.as_bytes()) {
            Ok(_) => Ok(true),
            Err(EngineError::KeyNotFound) => Ok(false),
            Err(e) => Err(from_engine(e)),
        }
    }

    /// Length of the value under `key`
    pub fn get_size(&mut self, key: &Key) -> Result<usize> {
        Ok(self.item(key)?.value_size())
    }

    /// Buffer a write
    pub fn put(&mut self, key: &Key, value: &[u8]) -> Result<()> {
        self.txn.set(key.as_bytes(), value).map_err(from_engine)
    }

    /// Buffer a delete; deleting an absent key is not an error
    pub fn delete(&mut self, key: &Key) -> Result<()> {
        self.txn.delete(key.as_bytes()).map_err(from_engine)
    }

    /// Buffer a write that expires `ttl` from now
    pub fn put_with_ttl(&mut self, key: &Key, value: &[u8], ttl: Duration) -> Result<()> {
        self.txn
            .set_with_ttl(key.as_bytes(), value, ttl)
            .map_err(from_engine)
    }

    /// Rewrite the current value of `key` to expire `ttl` from now
    ///
    /// This is a read followed by a write inside this transaction. It is only
    /// as isolated as the transaction: a concurrent writer of `key` makes the
    /// commit fail with a conflict rather than being merged.
    pub fn set_ttl(&mut self, key: &Key, ttl: Duration) -> Result<()> {
        let item = self.item(key)?;
        let value = item
            .value_arc()
            .cloned()
            .unwrap_or_else(|| Arc::from(&[][..]));
        self.txn
            .set_with_ttl(key.as_bytes(), value, ttl)
            .map_err(from_engine)
    }

    /// Absolute expiration of `key`
    ///
    /// Fails with [`Error::NotFound`] when the key is absent or has no
    /// expiration.
    pub fn get_expiration(&mut self, key: &Key) -> Result<DateTime<Utc>> {
        let secs = self.item(key)?.expires_at().ok_or(Error::NotFound)?;
        Utc.timestamp_opt(secs as i64, 0)
            .single()
            .ok_or_else(|| Error::engine(format!("expiration {} out of range", secs)))
    }

    /// Query this transaction's view
    ///
    /// The stream captures the view as it is now; later writes through this
    /// transaction are not visible to it, and committing or discarding the
    /// transaction leaves it running.
    pub fn query(&mut self, query: Query) -> Result<Results> {
        query::execute(&self.txn, query, self.query_buffer)
    }

    /// Hand the transaction to a query worker that discards it when done
    pub(crate) fn into_query(self, query: Query) -> Result<Results> {
        query::execute_owned(self.txn, query, self.query_buffer)
    }

    /// Apply every buffered write atomically
    ///
    /// A conflicting commit fails with [`Error::TransactionConflict`], which
    /// is retryable.
    pub fn commit(&mut self) -> Result<()> {
        self.txn.commit().map(|_| ()).map_err(from_engine)
    }

    /// Drop every buffered write
    pub fn discard(&mut self) {
        self.txn.discard();
    }

    /// Whether writes are rejected
    pub fn is_read_only(&self) -> bool {
        self.txn.is_read_only()
    }

    /// Whether the transaction is still open
    pub fn is_active(&self) -> bool {
        self.txn.is_active()
    }
}

impl traits::Txn for Transaction {
    fn get(&mut self, key: &Key) -> Result<Vec<u8>> {
        Transaction::get(self, key)
    }

    fn has(&mut self, key: &Key) -> Result<bool> {
        Transaction::has(self, key)
    }

    fn get_size(&mut self, key: &Key) -> Result<usize> {
        Transaction::get_size(self, key)
    }

    fn put(&mut self, key: &Key, value: &[u8]) -> Result<()> {
        Transaction::put(self, key, value)
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        Transaction::delete(self, key)
    }

    fn query(&mut self, query: Query) -> Result<Results> {
        Transaction::query(self, query)
    }

    fn commit(&mut self) -> Result<()> {
        Transaction::commit(self)
    }

    fn discard(&mut self) {
        Transaction::discard(self)
    }
}

impl traits::TxnTtl for Transaction {
    fn put_with_ttl(&mut self, key: &Key, value: &[u8], ttl: Duration) -> Result<()> {
        Transaction::put_with_ttl(self, key, value, ttl)
    }

    fn set_ttl(&mut self, key: &Key, ttl: Duration) -> Result<()> {
        Transaction::set_ttl(self, key, ttl)
    }

    fn get_expiration(&mut self, key: &Key) -> Result<DateTime<Utc>> {
        Transaction::get_expiration(self, key)
    }
}
