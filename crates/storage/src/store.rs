//! Ordered MVCC store
//!
//! `OrderedStore` keeps every key in a `BTreeMap` ordered by raw bytes, each
//! key holding a newest-first [`VersionChain`]. Readers see the store through
//! a [`Snapshot`](crate::Snapshot) pinned at a commit version.
//!
//! # Design Notes
//!
//! - One `RwLock` guards the map and the TTL index together, so a commit's
//!   write set becomes visible atomically.
//! - The published version is bumped while the write lock is still held:
//!   a snapshot either sees all of a commit or none of it.
//! - Live snapshots are registered by version; pruning never drops a version
//!   that the oldest registered snapshot can still see.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::chain::VersionChain;
use crate::cursor::CursorItem;
use crate::error::{Result, StorageError};
use crate::snapshot::Snapshot;
use crate::stored_value::StoredValue;
use crate::ttl::TtlIndex;

/// One mutation of a write set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Write a value
    Put {
        /// Raw key
        key: Vec<u8>,
        /// Value bytes
        value: Arc<[u8]>,
        /// Absolute expiration (unix seconds)
        expires_at: Option<u64>,
    },
    /// Write a tombstone
    Delete {
        /// Raw key
        key: Vec<u8>,
    },
}

impl WriteOp {
    /// Raw key touched by the operation
    pub fn key(&self) -> &[u8] {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }

    fn into_stored(self, version: u64) -> (Vec<u8>, StoredValue) {
        match self {
            WriteOp::Put {
                key,
                value,
                expires_at,
            } => (key, StoredValue::put(value, version, expires_at)),
            WriteOp::Delete { key } => (key, StoredValue::tombstone(version)),
        }
    }
}

/// Outcome of a pruning pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Expired values turned into tombstones
    pub expired: usize,
    /// Old versions dropped from chains
    pub versions_removed: usize,
    /// Keys dropped entirely (lone tombstones)
    pub keys_removed: usize,
}

#[derive(Debug, Default)]
struct Inner {
    data: BTreeMap<Vec<u8>, VersionChain>,
    ttl: TtlIndex,
}

/// One page of a cursor scan
pub(crate) struct Page {
    pub items: Vec<CursorItem>,
    /// Last key examined, visible or not
    pub last_scanned: Option<Vec<u8>>,
    /// Whether the range has no more keys
    pub exhausted: bool,
}

/// How a scan reads entries
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScanView {
    pub version: u64,
    pub now: u64,
    pub keys_only: bool,
    pub reverse: bool,
}

/// Ordered, versioned, in-memory key index
#[derive(Debug)]
pub struct OrderedStore {
    inner: RwLock<Inner>,
    /// Highest published commit version
    version: AtomicU64,
    /// Live snapshot versions and their reference counts
    snapshots: Mutex<BTreeMap<u64, usize>>,
    closed: AtomicBool,
}

impl OrderedStore {
    /// Create an empty store at version 0
    pub fn new() -> Self {
        OrderedStore {
            inner: RwLock::new(Inner::default()),
            version: AtomicU64::new(0),
            snapshots: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Highest published commit version
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Take a snapshot at the current version
    pub fn snapshot(self: &Arc<Self>) -> Snapshot {
        Snapshot::new(Arc::clone(self))
    }

    /// Newest entry for `key` (value or tombstone), ignoring snapshots
    pub fn get_latest(&self, key: &[u8]) -> Result<Option<StoredValue>> {
        self.ensure_open()?;
        Ok(self
            .inner
            .read()
            .data
            .get(key)
            .and_then(|chain| chain.latest().cloned()))
    }

    /// Version of the newest value for `key`, 0 if it is absent or deleted
    ///
    /// Used to validate reads at commit time.
    pub fn live_version(&self, key: &[u8]) -> Result<u64> {
        Ok(match self.get_latest(key)? {
            Some(sv) if !sv.is_tombstone() => sv.version(),
            _ => 0,
        })
    }

    /// Apply a write set at `version` and publish it
    ///
    /// The caller serializes commits and passes a version above the current
    /// one. Returns the number of operations applied.
    pub fn apply(&self, ops: Vec<WriteOp>, version: u64) -> Result<usize> {
        self.ensure_open()?;
        let count = ops.len();
        let mut inner = self.inner.write();
        for op in ops {
            let (key, value) = op.into_stored(version);
            let Inner { data, ttl } = &mut *inner;
            if let Some(expires_at) = value.expires_at() {
                ttl.insert(expires_at, key.clone());
            }
            match data.get_mut(&key) {
                Some(chain) => {
                    if let Some(old) = chain.latest().and_then(|head| head.expires_at()) {
                        if Some(old) != value.expires_at() {
                            ttl.remove(old, &key);
                        }
                    }
                    chain.push(value);
                }
                None => {
                    data.insert(key, VersionChain::new(value));
                }
            }
        }
        self.version.fetch_max(version, Ordering::AcqRel);
        Ok(count)
    }

    /// Install one operation read back from the log
    ///
    /// Only the newest version per key survives. Call
    /// [`finish_recovery`](Self::finish_recovery) once every record is replayed.
    pub fn recover(&self, op: WriteOp, version: u64) {
        let (key, value) = op.into_stored(version);
        let mut inner = self.inner.write();
        let Inner { data, ttl } = &mut *inner;
        let new_expiry = value.expires_at();
        match data.get_mut(&key) {
            Some(chain) => {
                let old_expiry = chain.latest().and_then(|head| head.expires_at());
                if chain.recover(value) {
                    if let Some(old) = old_expiry {
                        ttl.remove(old, &key);
                    }
                    if let Some(expires_at) = new_expiry {
                        ttl.insert(expires_at, key);
                    }
                }
            }
            None => {
                if let Some(expires_at) = new_expiry {
                    ttl.insert(expires_at, key.clone());
                }
                data.insert(key, VersionChain::new(value));
            }
        }
    }

    /// Publish the highest version seen during recovery
    pub fn finish_recovery(&self, max_version: u64) {
        self.version.fetch_max(max_version, Ordering::AcqRel);
        debug!(target: "cairn::store", version = max_version, keys = self.key_count(), "Recovery applied");
    }

    /// Number of keys with at least one version (tombstones included)
    pub fn key_count(&self) -> usize {
        self.inner.read().data.len()
    }

    /// Number of live snapshots
    pub fn active_snapshots(&self) -> usize {
        self.snapshots.lock().values().sum()
    }

    /// Oldest version a live snapshot can read; the current version if none
    pub fn min_active_version(&self) -> u64 {
        let snapshots = self.snapshots.lock();
        snapshots
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| self.version())
    }

    /// Bury expired values and drop versions no snapshot can see
    pub fn prune(&self, now: u64) -> PruneStats {
        let min_version = self.min_active_version();
        let mut stats = PruneStats::default();
        let mut inner = self.inner.write();
        let Inner { data, ttl } = &mut *inner;

        for key in ttl.drain_expired(now) {
            if let Some(chain) = data.get_mut(&key) {
                if chain.expire_head(now) {
                    stats.expired += 1;
                }
            }
        }

        data.retain(|_, chain| {
            stats.versions_removed += chain.prune(min_version);
            if chain.is_removable(min_version) {
                stats.keys_removed += 1;
                false
            } else {
                true
            }
        });
        stats
    }

    /// Refuse further reads and writes
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Snapshot support
    // ========================================================================

    /// Register a snapshot at the current version and return that version
    pub(crate) fn register_snapshot(&self) -> u64 {
        let mut snapshots = self.snapshots.lock();
        // read under the registry lock so pruning sees either the
        // registration or a version no older than this one
        let version = self.version();
        *snapshots.entry(version).or_insert(0) += 1;
        version
    }

    /// Register another reader of an existing snapshot version
    pub(crate) fn retain_snapshot(&self, version: u64) {
        *self.snapshots.lock().entry(version).or_insert(0) += 1;
    }

    /// Drop one reader of a snapshot version
    pub(crate) fn release_snapshot(&self, version: u64) {
        let mut snapshots = self.snapshots.lock();
        if let Some(count) = snapshots.get_mut(&version) {
            *count -= 1;
            if *count == 0 {
                snapshots.remove(&version);
            }
        }
    }

    /// Entry for `key` visible at `version` (value or tombstone)
    pub(crate) fn get_at(&self, key: &[u8], version: u64) -> Result<Option<StoredValue>> {
        self.ensure_open()?;
        Ok(self
            .inner
            .read()
            .data
            .get(key)
            .and_then(|chain| chain.get_at_version(version).cloned()))
    }

    /// Read up to `limit` visible entries between two bounds
    ///
    /// Scans at most `limit * 8` keys so a run of tombstones cannot hold the
    /// read lock for long.
    pub(crate) fn scan_page(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        view: ScanView,
        limit: usize,
    ) -> Result<Page> {
        self.ensure_open()?;
        if range_is_empty(lower, upper) {
            return Ok(Page {
                items: Vec::new(),
                last_scanned: None,
                exhausted: true,
            });
        }

        let limit = limit.max(1);
        let max_scanned = limit.saturating_mul(8);
        let inner = self.inner.read();
        let range = inner.data.range::<[u8], _>((lower, upper));
        let iter: Box<dyn Iterator<Item = (&Vec<u8>, &VersionChain)>> = if view.reverse {
            Box::new(range.rev())
        } else {
            Box::new(range)
        };

        let mut items = Vec::new();
        let mut last_scanned: Option<&Vec<u8>> = None;
        let mut scanned = 0usize;
        let mut exhausted = true;
        for (key, chain) in iter {
            last_scanned = Some(key);
            scanned += 1;
            if let Some(sv) = chain.get_at_version(view.version) {
                if sv.is_live_at(view.now) {
                    items.push(CursorItem::from_stored(key, sv, view.keys_only));
                }
            }
            if items.len() >= limit || scanned >= max_scanned {
                exhausted = false;
                break;
            }
        }

        Ok(Page {
            items,
            last_scanned: last_scanned.cloned(),
            exhausted,
        })
    }
}

impl Default for OrderedStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a bounded range holds no keys (and would make `BTreeMap::range` panic)
fn range_is_empty(lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> bool {
    match (lower, upper) {
        (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
        (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi))
        | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
        _ => false,
    }
}
