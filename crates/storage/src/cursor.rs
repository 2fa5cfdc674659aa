//! Ordered cursors over a snapshot
//!
//! A cursor walks the keys under a prefix in byte order, forward or reverse,
//! reading a page at a time. Each page takes the store's read lock only
//! briefly, so a slow consumer never blocks writers.
//!
//! Tombstones and values expired at the cursor's creation time are skipped.

use std::collections::VecDeque;
use std::ops::Bound;
use std::sync::Arc;

use crate::error::Result;
use crate::snapshot::Snapshot;
use crate::store::ScanView;
use crate::stored_value::{now_secs, StoredValue};

/// Default number of entries fetched per page
pub const DEFAULT_PAGE_SIZE: usize = 64;

/// Cursor configuration
#[derive(Debug, Clone)]
pub struct CursorOptions {
    /// Only keys starting with these bytes
    pub prefix: Vec<u8>,
    /// Walk from the largest key down
    pub reverse: bool,
    /// Leave values out of the items
    pub keys_only: bool,
    /// Entries fetched per read-lock acquisition
    pub page_size: usize,
}

impl Default for CursorOptions {
    fn default() -> Self {
        CursorOptions {
            prefix: Vec::new(),
            reverse: false,
            keys_only: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl CursorOptions {
    /// Options for keys under `prefix`
    pub fn with_prefix(prefix: impl Into<Vec<u8>>) -> Self {
        CursorOptions {
            prefix: prefix.into(),
            ..Default::default()
        }
    }
}

/// One visible entry yielded by a cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorItem {
    /// Raw key
    pub key: Vec<u8>,
    /// Value bytes, `None` for keys-only cursors
    pub value: Option<Arc<[u8]>>,
    /// Commit version that wrote the value
    pub version: u64,
    /// Absolute expiration (unix seconds)
    pub expires_at: Option<u64>,
    /// Value length in bytes
    pub size: usize,
}

impl CursorItem {
    pub(crate) fn from_stored(key: &[u8], sv: &StoredValue, keys_only: bool) -> Self {
        CursorItem {
            key: key.to_vec(),
            value: if keys_only { None } else { sv.value().cloned() },
            version: sv.version(),
            expires_at: sv.expires_at(),
            size: sv.size(),
        }
    }
}

#[derive(Debug, Clone)]
enum Position {
    Start,
    /// Continue past this key
    After(Vec<u8>),
    /// Continue at this key
    From(Vec<u8>),
}

/// Smallest byte string greater than every string starting with `prefix`
///
/// `None` when no such string exists (empty or all-`0xFF` prefix).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Paging iterator over a snapshot
#[derive(Debug)]
pub struct Cursor {
    snapshot: Snapshot,
    options: CursorOptions,
    upper: Option<Vec<u8>>,
    now: u64,
    position: Position,
    buffer: VecDeque<CursorItem>,
    done: bool,
}

impl Cursor {
    pub(crate) fn new(snapshot: Snapshot, options: CursorOptions) -> Self {
        let upper = prefix_successor(&options.prefix);
        Cursor {
            snapshot,
            options,
            upper,
            now: now_secs(),
            position: Position::Start,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Reposition at `key`
    ///
    /// Forward cursors continue at the first key `>= key`, reverse cursors at
    /// the last key `<= key`. Positions outside the prefix clamp to its edge.
    pub fn seek(&mut self, key: &[u8]) {
        self.buffer.clear();
        self.done = false;
        self.position = Position::From(key.to_vec());
    }

    /// Wall-clock second used for expiry checks
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Snapshot version the cursor reads at
    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    fn bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        let prefix = self.options.prefix.as_slice();
        let prefix_end = match &self.upper {
            Some(end) => Bound::Excluded(end.as_slice()),
            None => Bound::Unbounded,
        };

        if self.options.reverse {
            let upper = match &self.position {
                Position::Start => prefix_end,
                Position::After(key) => Bound::Excluded(key.as_slice()),
                Position::From(key) => match &self.upper {
                    Some(end) if key.as_slice() >= end.as_slice() => prefix_end,
                    _ => Bound::Included(key.as_slice()),
                },
            };
            (Bound::Included(prefix), upper)
        } else {
            let lower = match &self.position {
                Position::Start => Bound::Included(prefix),
                Position::After(key) => Bound::Excluded(key.as_slice()),
                Position::From(key) if key.as_slice() < prefix => Bound::Included(prefix),
                Position::From(key) => Bound::Included(key.as_slice()),
            };
            (lower, prefix_end)
        }
    }

    fn fill(&mut self) -> Result<()> {
        let view = ScanView {
            version: self.snapshot.version(),
            now: self.now,
            keys_only: self.options.keys_only,
            reverse: self.options.reverse,
        };
        let page = {
            let (lower, upper) = self.bounds();
            self.snapshot
                .store()
                .scan_page(lower, upper, view, self.options.page_size)?
        };

        self.buffer.extend(page.items);
        match page.last_scanned {
            Some(key) if !page.exhausted => self.position = Position::After(key),
            _ => self.done = true,
        }
        Ok(())
    }
}

impl Iterator for Cursor {
    type Item = Result<CursorItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fill() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
