//! The datastore facade
//!
//! Every single-call operation runs in its own implicit transaction:
//! read-only for reads, read-write and committed before returning for
//! writes. A query hands its implicit transaction to the query worker, which
//! discards it when the stream ends or is closed.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cairn_core::datastore as traits;
use cairn_core::{Error, Key, Query, Result, Results};
use cairn_engine::Engine;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::info;

use crate::batch::Batch;
use crate::error::from_engine;
use crate::gc::{self, GcWorker};
use crate::options::Options;
use crate::txn::Transaction;

/// Transactional ordered key-value datastore
pub struct Datastore {
    engine: Arc<Engine>,
    options: Options,
    gc: Mutex<Option<GcWorker>>,
}

impl Datastore {
    /// Open or create the datastore in `path`
    ///
    /// ```no_run
    /// use cairn::{Datastore, Key, Options};
    ///
    /// let ds = Datastore::open("/tmp/cairn", Options::default())?;
    /// ds.put(&Key::new("/greeting"), b"hello")?;
    /// assert_eq!(ds.get(&Key::new("/greeting"))?, b"hello");
    /// ds.close()?;
    /// # Ok::<(), cairn::Error>(())
    /// ```
    ///
    /// Fails with [`Error::UnsupportedVersion`] if the directory was written
    /// by a newer format.
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref();
        let engine = Engine::open(path, options.engine_config()).map_err(from_engine)?;

        let worker = match options.gc_interval {
            Some(interval) => Some(
                GcWorker::start(
                    Arc::clone(&engine),
                    interval,
                    options.gc_sleep,
                    options.gc_discard_ratio,
                )
                .map_err(|e| Error::engine_with_source("failed to start GC worker", e))?,
            ),
            None => None,
        };

        info!(
            target: "cairn::engine",
            path = ?path,
            gc_interval_ms = options.gc_interval.map(|d| d.as_millis() as u64),
            native_batch = options.native_batch,
            "Datastore opened"
        );
        Ok(Datastore {
            engine,
            options,
            gc: Mutex::new(worker),
        })
    }

    /// Stop background GC and close the engine
    ///
    /// Idempotent. Later operations fail with an engine error.
    pub fn close(&self) -> Result<()> {
        if let Some(mut worker) = self.gc.lock().take() {
            worker.stop();
        }
        self.engine.close().map_err(from_engine)
    }

    /// Options the datastore was opened with
    pub fn options(&self) -> &Options {
        &self.options
    }

    fn read<T>(&self, f: impl FnOnce(&mut Transaction) -> Result<T>) -> Result<T> {
        let mut txn = self.new_transaction(true)?;
        f(&mut txn)
    }

    fn write(&self, f: impl FnOnce(&mut Transaction) -> Result<()>) -> Result<()> {
        let mut txn = self.new_transaction(false)?;
        f(&mut txn)?;
        txn.commit()
    }

    /// Value stored under `key`
    pub fn get(&self, key: &Key) -> Result<Vec<u8>> {
        self.read(|txn| txn.get(key))
    }

    /// Whether `key` exists
    pub fn has(&self, key: &Key) -> Result<bool> {
        self.read(|txn| txn.has(key))
    }

    /// Length of the value under `key`
    pub fn get_size(&self, key: &Key) -> Result<usize> {
        self.read(|txn| txn.get_size(key))
    }

    /// Store `value` under `key`
    pub fn put(&self, key: &Key, value: &[u8]) -> Result<()> {
        self.write(|txn| txn.put(key, value))
    }

    /// Remove `key`
    pub fn delete(&self, key: &Key) -> Result<()> {
        self.write(|txn| txn.delete(key))
    }

    /// Store `value` under `key`, expiring `ttl` from now
    pub fn put_with_ttl(&self, key: &Key, value: &[u8], ttl: Duration) -> Result<()> {
        self.write(|txn| txn.put_with_ttl(key, value, ttl))
    }

    /// Rewrite the current value of `key` to expire `ttl` from now
    pub fn set_ttl(&self, key: &Key, ttl: Duration) -> Result<()> {
        self.write(|txn| txn.set_ttl(key, ttl))
    }

    /// Absolute expiration of `key`; [`Error::NotFound`] if it has none
    pub fn get_expiration(&self, key: &Key) -> Result<DateTime<Utc>> {
        self.read(|txn| txn.get_expiration(key))
    }

    /// Run a query over the current state
    pub fn query(&self, query: Query) -> Result<Results> {
        self.new_transaction(true)?.into_query(query)
    }

    /// Start an explicit transaction
    pub fn new_transaction(&self, read_only: bool) -> Result<Transaction> {
        let txn = self.engine.begin(read_only).map_err(from_engine)?;
        Ok(Transaction::new(txn, self.options.query_buffer))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.engine.is_closed() {
            return Err(from_engine(cairn_engine::EngineError::Closed));
        }
        Ok(())
    }

    /// Start a batch
    pub fn batch(&self) -> Result<Batch> {
        self.ensure_open()?;
        Ok(Batch::new(Arc::clone(&self.engine), self.options.native_batch))
    }

    /// Approximate bytes used on disk
    pub fn disk_usage(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.engine.disk_usage())
    }

    /// Rewrite value log segments until none has `gc_discard_ratio` dead bytes
    ///
    /// Finding nothing to rewrite is not an error.
    pub fn collect_garbage(&self) -> Result<()> {
        let rewritten = gc::collect(&self.engine, self.options.gc_discard_ratio)
            .map_err(from_engine)?;
        info!(target: "cairn::gc", rewritten, "Garbage collection done");
        Ok(())
    }

    /// Flush the value log to stable storage
    ///
    /// The log is shared by every key, so `prefix` only scopes the request.
    pub fn sync(&self, _prefix: &Key) -> Result<()> {
        self.engine.sync().map_err(from_engine)
    }
}

impl Drop for Datastore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore")
            .field("engine", &self.engine)
            .field("options", &self.options)
            .finish()
    }
}

impl traits::Datastore for Datastore {
    fn get(&self, key: &Key) -> Result<Vec<u8>> {
        Datastore::get(self, key)
    }

    fn has(&self, key: &Key) -> Result<bool> {
        Datastore::has(self, key)
    }

    fn get_size(&self, key: &Key) -> Result<usize> {
        Datastore::get_size(self, key)
    }

    fn put(&self, key: &Key, value: &[u8]) -> Result<()> {
        Datastore::put(self, key, value)
    }

    fn delete(&self, key: &Key) -> Result<()> {
        Datastore::delete(self, key)
    }

    fn query(&self, query: Query) -> Result<Results> {
        Datastore::query(self, query)
    }

    fn sync(&self, prefix: &Key) -> Result<()> {
        Datastore::sync(self, prefix)
    }
}

impl traits::Batching for Datastore {
    type Batch = Batch;

    fn batch(&self) -> Result<Batch> {
        Datastore::batch(self)
    }
}

impl traits::TxnDatastore for Datastore {
    type Txn = Transaction;

    fn new_transaction(&self, read_only: bool) -> Result<Transaction> {
        Datastore::new_transaction(self, read_only)
    }
}

impl traits::TtlDatastore for Datastore {
    fn put_with_ttl(&self, key: &Key, value: &[u8], ttl: Duration) -> Result<()> {
        Datastore::put_with_ttl(self, key, value, ttl)
    }

    fn set_ttl(&self, key: &Key, ttl: Duration) -> Result<()> {
        Datastore::set_ttl(self, key, ttl)
    }

    fn get_expiration(&self, key: &Key) -> Result<DateTime<Utc>> {
        Datastore::get_expiration(self, key)
    }
}

impl traits::GcDatastore for Datastore {
    fn collect_garbage(&self) -> Result<()> {
        Datastore::collect_garbage(self)
    }
}

impl traits::PersistentDatastore for Datastore {
    fn disk_usage(&self) -> Result<u64> {
        Datastore::disk_usage(self)
    }
}
