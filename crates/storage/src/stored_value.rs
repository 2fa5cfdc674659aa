//! Stored values with version and expiration
//!
//! A `StoredValue` is one entry of a key's version chain: the value bytes (or
//! a tombstone), the commit version that wrote it, and an optional absolute
//! expiration in whole unix seconds.
//!
//! Expiration is second-granular so every reader of the same entry reports the
//! same instant.

use std::sync::Arc;

use chrono::Utc;

/// Current time in whole unix seconds
pub fn now_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// A versioned value or tombstone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    /// Value bytes; `None` marks a tombstone
    value: Option<Arc<[u8]>>,
    /// Commit version that wrote this entry
    version: u64,
    /// Absolute expiration (unix seconds)
    expires_at: Option<u64>,
}

impl StoredValue {
    /// Create a value entry
    pub fn put(value: Arc<[u8]>, version: u64, expires_at: Option<u64>) -> Self {
        StoredValue {
            value: Some(value),
            version,
            expires_at,
        }
    }

    /// Create a tombstone
    pub fn tombstone(version: u64) -> Self {
        StoredValue {
            value: None,
            version,
            expires_at: None,
        }
    }

    /// Value bytes, `None` for a tombstone
    #[inline]
    pub fn value(&self) -> Option<&Arc<[u8]>> {
        self.value.as_ref()
    }

    /// Commit version
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Absolute expiration in unix seconds
    #[inline]
    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    /// Whether this entry is a tombstone
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Whether the entry has expired at `now` (unix seconds)
    ///
    /// An entry expiring at second `t` is gone from second `t` onwards.
    pub fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(t) if t <= now)
    }

    /// Whether a reader at `now` sees a value
    pub fn is_live_at(&self, now: u64) -> bool {
        !self.is_tombstone() && !self.is_expired_at(now)
    }

    /// Length of the value in bytes (0 for tombstones)
    pub fn size(&self) -> usize {
        self.value.as_ref().map_or(0, |v| v.len())
    }

    /// Turn this entry into a tombstone with the same version
    pub(crate) fn bury(&mut self) {
        self.value = None;
        self.expires_at = None;
    }
}
