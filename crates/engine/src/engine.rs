//! Engine handle and open/close logic
//!
//! An [`Engine`] owns one database directory:
//!
//! ```text
//! <dir>/LOCK              exclusive advisory lock held while open
//! <dir>/MANIFEST          database identity and format version
//! <dir>/vlog-NNNNNN.seg   value log segments
//! ```
//!
//! Opening takes the lock, checks the MANIFEST, replays the value log into a
//! fresh in-memory store and starts the maintenance thread. Closing stops the
//! thread, syncs the log, closes the store and releases the lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cairn_concurrency::{from_log_op, TransactionManager, WriteBatch};
use cairn_durability::{ManifestManager, ValueLog, MANIFEST_FILE_NAME};
use cairn_storage::{now_secs, OrderedStore, PruneStats};
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::gc::{self, ReclaimStats};
use crate::maintenance::Maintenance;
use crate::txn::EngineTxn;

/// Lock file name inside the database directory
pub const LOCK_FILE_NAME: &str = "LOCK";

/// An open database directory
pub struct Engine {
    path: PathBuf,
    config: EngineConfig,
    manager: TransactionManager,
    manifest: ManifestManager,
    maintenance: Mutex<Option<Maintenance>>,
    lock_file: Mutex<Option<File>>,
    closed: AtomicBool,
}

impl Engine {
    /// Open or create the database in `path`
    ///
    /// Fails with [`EngineError::Locked`] if another handle has the directory
    /// open and with [`EngineError::UnsupportedVersion`] if it was written by
    /// a newer format.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path.join(LOCK_FILE_NAME))?;
        fs2::FileExt::try_lock_exclusive(&lock_file)
            .map_err(|_| EngineError::Locked(path.clone()))?;

        let manifest_path = path.join(MANIFEST_FILE_NAME);
        let manifest = if ManifestManager::exists(&manifest_path) {
            ManifestManager::load(manifest_path)?
        } else {
            let manifest = ManifestManager::create(manifest_path, *Uuid::new_v4().as_bytes())?;
            info!(target: "cairn::engine", path = ?path, "Created new database");
            manifest
        };
        let database_uuid = manifest.manifest().database_uuid;

        let store = Arc::new(OrderedStore::new());
        let (log, stats) = ValueLog::open(&path, database_uuid, config.value_log(), |record| {
            for op in record.ops {
                store.recover(from_log_op(op), record.version);
            }
        })?;
        store.finish_recovery(stats.max_version);

        info!(
            target: "cairn::engine",
            path = ?path,
            segments = stats.segments,
            records = stats.records,
            version = stats.max_version,
            truncated_bytes = stats.truncated_bytes,
            keys = store.key_count(),
            "Recovery complete"
        );

        let maintenance = if config.maintenance_interval_ms > 0 {
            let interval = Duration::from_millis(config.maintenance_interval_ms);
            Some(Maintenance::start(Arc::clone(&store), interval)?)
        } else {
            None
        };

        let manager = TransactionManager::new(store, log, config.txn_limits());
        Ok(Arc::new(Engine {
            path,
            config,
            manager,
            manifest,
            maintenance: Mutex::new(maintenance),
            lock_file: Mutex::new(Some(lock_file)),
            closed: AtomicBool::new(false),
        }))
    }

    /// Stop background work, flush the log and release the directory
    ///
    /// Idempotent. Every later operation fails with [`EngineError::Closed`].
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(mut maintenance) = self.maintenance.lock().take() {
            maintenance.stop();
        }

        // wait out an in-flight commit, then refuse new ones
        let synced = self.manager.with_log(|log, store| {
            store.close();
            log.sync()
        });

        if let Some(lock_file) = self.lock_file.lock().take() {
            let _ = fs2::FileExt::unlock(&lock_file);
        }
        info!(target: "cairn::engine", path = ?self.path, "Engine closed");
        synced.map_err(EngineError::from)
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    /// Start a transaction on the current state
    pub fn begin(self: &Arc<Self>, read_only: bool) -> Result<EngineTxn> {
        self.ensure_open()?;
        let ctx = self.manager.begin(read_only)?;
        Ok(EngineTxn::new(Arc::clone(self), ctx))
    }

    /// Apply a batch atomically, bypassing conflict checks and size limits
    ///
    /// Returns the commit version.
    pub fn write_batch(&self, batch: WriteBatch) -> Result<u64> {
        self.ensure_open()?;
        let ops = batch.len();
        let version = self.manager.write_batch(batch)?;
        debug!(target: "cairn::txn", ops, version, "Batch applied");
        Ok(version)
    }

    /// Approximate bytes on disk: every value log segment plus the MANIFEST
    pub fn disk_usage(&self) -> u64 {
        self.manager.with_log(|log, _| log.disk_usage()) + self.manifest.file_size()
    }

    /// Rewrite one sealed value log segment with at least `discard_ratio` dead bytes
    ///
    /// Returns [`EngineError::NoRewrite`] when no segment qualifies.
    pub fn reclaim_space(&self, discard_ratio: f64) -> Result<ReclaimStats> {
        self.ensure_open()?;
        self.manager
            .with_log(|log, store| gc::reclaim(log, store, discard_ratio, now_secs()))
    }

    /// Seal the active value log segment so reclamation can consider it
    pub fn rotate_log(&self) -> Result<()> {
        self.ensure_open()?;
        self.manager.with_log(|log, _| log.rotate())?;
        Ok(())
    }

    /// fsync the value log
    pub fn sync(&self) -> Result<()> {
        self.ensure_open()?;
        self.manager.with_log(|log, _| log.sync())?;
        Ok(())
    }

    /// Run one pruning pass now
    pub fn prune(&self) -> Result<PruneStats> {
        self.ensure_open()?;
        Ok(self.manager.store().prune(now_secs()))
    }

    /// Highest committed version
    pub fn version(&self) -> u64 {
        self.manager.current_version()
    }

    /// Database directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configuration the engine was opened with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn manager(&self) -> &TransactionManager {
        &self.manager
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.path)
            .field("version", &self.version())
            .field("closed", &self.is_closed())
            .finish()
    }
}
