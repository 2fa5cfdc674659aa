//! Engine transactions
//!
//! [`EngineTxn`] pairs a transaction context with the engine that commits
//! it. Reads see the snapshot taken at `begin` plus the transaction's own
//! writes; commit validates every key read and fails with
//! [`EngineError::Conflict`] if one of them changed.

use std::sync::Arc;
use std::time::Duration;

use cairn_concurrency::{TransactionContext, TransactionIterator};
use cairn_storage::{CursorItem, CursorOptions, StoredValue};
use chrono::Utc;
use tracing::debug;

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// Absolute expiration (unix seconds) `ttl` from now
///
/// Rounded up to the next whole second, so a key lives at least `ttl` and
/// less than `ttl + 1s`.
pub fn expiry_after(ttl: Duration) -> u64 {
    let now = Utc::now().timestamp_micros().max(0) as u128;
    ((now + ttl.as_micros() + 999_999) / 1_000_000) as u64
}

/// A key with its value and metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    key: Vec<u8>,
    value: Option<Arc<[u8]>>,
    version: u64,
    expires_at: Option<u64>,
    size: usize,
}

impl Item {
    fn from_stored(key: &[u8], sv: StoredValue) -> Self {
        Item {
            key: key.to_vec(),
            size: sv.size(),
            version: sv.version(),
            expires_at: sv.expires_at(),
            value: sv.value().cloned(),
        }
    }

    /// Raw key
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Value bytes; `None` when iterating keys only
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Shared value buffer
    pub fn value_arc(&self) -> Option<&Arc<[u8]>> {
        self.value.as_ref()
    }

    /// Commit version that wrote the value; 0 for an uncommitted write
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Absolute expiration in unix seconds
    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    /// Length of the value, known even when the value was not loaded
    pub fn value_size(&self) -> usize {
        self.size
    }
}

impl From<CursorItem> for Item {
    fn from(item: CursorItem) -> Self {
        Item {
            key: item.key,
            value: item.value,
            version: item.version,
            expires_at: item.expires_at,
            size: item.size,
        }
    }
}

/// Iterator over a transaction's view
///
/// Owns its snapshot, so it stays usable after the transaction ends. A
/// failure is yielded once, after which the iterator is exhausted.
#[derive(Debug)]
pub struct EngineIter {
    inner: TransactionIterator,
}

impl Iterator for EngineIter {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|r| r.map(Item::from).map_err(EngineError::from))
    }
}

/// A transaction against an [`Engine`]
pub struct EngineTxn {
    engine: Arc<Engine>,
    ctx: TransactionContext,
}

impl EngineTxn {
    pub(crate) fn new(engine: Arc<Engine>, ctx: TransactionContext) -> Self {
        EngineTxn { engine, ctx }
    }

    /// Live value for `key`, or [`EngineError::KeyNotFound`]
    pub fn get(&mut self, key: &[u8]) -> Result<Item> {
        match self.ctx.get(key)? {
            Some(sv) => Ok(Item::from_stored(key, sv)),
            None => Err(EngineError::KeyNotFound),
        }
    }

    /// Buffer a write without expiration
    pub fn set(&mut self, key: &[u8], value: impl Into<Arc<[u8]>>) -> Result<()> {
        self.ctx.put(key.to_vec(), value.into(), None)?;
        Ok(())
    }

    /// Buffer a write that expires `ttl` from now
    pub fn set_with_ttl(
        &mut self,
        key: &[u8],
        value: impl Into<Arc<[u8]>>,
        ttl: Duration,
    ) -> Result<()> {
        self.ctx
            .put(key.to_vec(), value.into(), Some(expiry_after(ttl)))?;
        Ok(())
    }

    /// Buffer a delete
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.ctx.delete(key.to_vec())?;
        Ok(())
    }

    /// Iterate this transaction's view
    pub fn iter(&self, options: CursorOptions) -> Result<EngineIter> {
        Ok(EngineIter {
            inner: self.ctx.iter(options)?,
        })
    }

    /// Apply every buffered write atomically; returns the commit version
    pub fn commit(&mut self) -> Result<u64> {
        let version = self.engine.manager().commit(&mut self.ctx)?;
        Ok(version)
    }

    /// Drop every buffered write; a no-op once the transaction has ended
    pub fn discard(&mut self) {
        if self.ctx.is_active() {
            debug!(target: "cairn::txn", txn_id = self.ctx.txn_id, writes = self.ctx.write_count(), "Transaction discarded");
        }
        self.ctx.discard();
    }

    /// Whether reads and writes are still accepted
    pub fn is_active(&self) -> bool {
        self.ctx.is_active()
    }

    /// Whether writes are rejected
    pub fn is_read_only(&self) -> bool {
        self.ctx.is_read_only()
    }

    /// Snapshot version the transaction reads at
    pub fn read_version(&self) -> u64 {
        self.ctx.start_version()
    }

    /// Number of buffered writes
    pub fn pending_writes(&self) -> usize {
        self.ctx.write_count()
    }
}

impl Drop for EngineTxn {
    fn drop(&mut self) {
        self.ctx.discard();
    }
}

impl std::fmt::Debug for EngineTxn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineTxn").field("ctx", &self.ctx).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> Arc<Engine> {
        let config = EngineConfig {
            sync_writes: false,
            maintenance_interval_ms: 0,
            ..Default::default()
        };
        Engine::open(dir.path(), config).unwrap()
    }

    #[test]
    fn expiry_is_never_before_now_plus_ttl() {
        for ttl_ms in [0u64, 1, 250, 999, 1000, 1001, 60_000] {
            let ttl = Duration::from_millis(ttl_ms);
            let earliest = Utc::now().timestamp_micros() as u128 + ttl.as_micros();
            let expiry = expiry_after(ttl) as u128 * 1_000_000;
            assert!(expiry >= earliest, "ttl {}ms expires early", ttl_ms);
            assert!(expiry < earliest + 1_000_000 + 50_000, "ttl {}ms", ttl_ms);
        }
    }

    #[test]
    fn get_missing_key_is_key_not_found() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let mut txn = engine.begin(true).unwrap();
        assert!(matches!(txn.get(b"/nope"), Err(EngineError::KeyNotFound)));
    }

    #[test]
    fn reads_own_writes_before_commit() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let mut txn = engine.begin(false).unwrap();
        txn.set(b"/a", &b"1"[..]).unwrap();
        let item = txn.get(b"/a").unwrap();
        assert_eq!(item.value(), Some(&b"1"[..]));
        assert_eq!(item.version(), 0);

        let mut other = engine.begin(true).unwrap();
        assert!(matches!(other.get(b"/a"), Err(EngineError::KeyNotFound)));

        let version = txn.commit().unwrap();
        let mut after = engine.begin(true).unwrap();
        assert_eq!(after.get(b"/a").unwrap().version(), version);
    }

    #[test]
    fn read_only_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let mut txn = engine.begin(true).unwrap();
        assert!(matches!(txn.set(b"/a", &b"1"[..]), Err(EngineError::ReadOnly)));
        assert!(matches!(txn.delete(b"/a"), Err(EngineError::ReadOnly)));
    }

    #[test]
    fn use_after_discard_is_not_active() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let mut txn = engine.begin(false).unwrap();
        txn.set(b"/a", &b"1"[..]).unwrap();
        txn.discard();
        txn.discard();
        assert!(matches!(txn.get(b"/a"), Err(EngineError::NotActive)));
        assert!(matches!(txn.commit(), Err(EngineError::NotActive)));

        let mut reader = engine.begin(true).unwrap();
        assert!(matches!(reader.get(b"/a"), Err(EngineError::KeyNotFound)));
    }

    #[test]
    fn ttl_sets_expiration() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let before = Utc::now().timestamp() as u64;
        let mut txn = engine.begin(false).unwrap();
        txn.set_with_ttl(b"/t", &b"v"[..], Duration::from_secs(60))
            .unwrap();
        txn.commit().unwrap();

        let mut reader = engine.begin(true).unwrap();
        let expires_at = reader.get(b"/t").unwrap().expires_at().unwrap();
        assert!(expires_at >= before + 60 && expires_at <= before + 62);
    }

    #[test]
    fn conflicting_commit_fails() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let mut t1 = engine.begin(false).unwrap();
        let mut t2 = engine.begin(false).unwrap();
        assert!(t1.get(b"/k").is_err());
        assert!(t2.get(b"/k").is_err());
        t1.set(b"/k", &b"1"[..]).unwrap();
        t2.set(b"/k", &b"2"[..]).unwrap();
        t1.commit().unwrap();
        let err = t2.commit().unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn iterator_yields_items_with_sizes() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let mut txn = engine.begin(false).unwrap();
        txn.set(b"/p/a", &b"one"[..]).unwrap();
        txn.set(b"/p/b", &b"three"[..]).unwrap();
        txn.set(b"/q", &b"x"[..]).unwrap();
        txn.commit().unwrap();

        let reader = engine.begin(true).unwrap();
        let options = CursorOptions {
            keys_only: true,
            ..CursorOptions::with_prefix("/p/")
        };
        let items: Vec<Item> = reader.iter(options).unwrap().map(|i| i.unwrap()).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key(), b"/p/a");
        assert!(items[0].value().is_none());
        assert_eq!(items[1].value_size(), 5);
    }
}
