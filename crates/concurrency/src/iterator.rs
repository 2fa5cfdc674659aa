//! Iteration that merges pending writes into a snapshot cursor
//!
//! Both inputs are ordered in the iteration direction. On equal keys the
//! pending write wins: a pending put replaces the snapshot entry and a
//! pending delete hides it.

use std::collections::VecDeque;
use std::iter::Peekable;

use cairn_storage::{Cursor, CursorItem, CursorOptions, StorageError};

use crate::transaction::PendingWrite;

enum Next {
    Cursor,
    Pending,
    /// Same key on both sides; the pending write shadows the cursor entry
    Both,
}

/// Snapshot cursor overlaid with a transaction's pending writes
#[derive(Debug)]
pub struct TransactionIterator {
    cursor: Peekable<Cursor>,
    pending: VecDeque<(Vec<u8>, PendingWrite)>,
    reverse: bool,
    keys_only: bool,
    now: u64,
}

impl TransactionIterator {
    pub(crate) fn new(
        cursor: Cursor,
        pending: Vec<(Vec<u8>, PendingWrite)>,
        options: &CursorOptions,
    ) -> Self {
        let now = cursor.now();
        let mut pending: VecDeque<_> = pending.into();
        if options.reverse {
            pending.make_contiguous().reverse();
        }
        TransactionIterator {
            cursor: cursor.peekable(),
            pending,
            reverse: options.reverse,
            keys_only: options.keys_only,
            now,
        }
    }

    fn pending_item(&self, key: Vec<u8>, write: PendingWrite) -> Option<CursorItem> {
        match write {
            PendingWrite::Put { value, expires_at } => {
                if matches!(expires_at, Some(t) if t <= self.now) {
                    return None;
                }
                Some(CursorItem {
                    key,
                    size: value.len(),
                    value: if self.keys_only { None } else { Some(value) },
                    version: 0,
                    expires_at,
                })
            }
            PendingWrite::Delete => None,
        }
    }

    fn choose(&mut self) -> Option<Next> {
        let cursor_key = match self.cursor.peek() {
            Some(Ok(item)) => Some(item.key.as_slice()),
            // surface the error before anything else
            Some(Err(_)) => return Some(Next::Cursor),
            None => None,
        };
        let pending_key = self.pending.front().map(|(k, _)| k.as_slice());

        match (cursor_key, pending_key) {
            (None, None) => None,
            (Some(_), None) => Some(Next::Cursor),
            (None, Some(_)) => Some(Next::Pending),
            (Some(c), Some(p)) => {
                let mut order = c.cmp(p);
                if self.reverse {
                    order = order.reverse();
                }
                Some(match order {
                    std::cmp::Ordering::Less => Next::Cursor,
                    std::cmp::Ordering::Greater => Next::Pending,
                    std::cmp::Ordering::Equal => Next::Both,
                })
            }
        }
    }
}

impl Iterator for TransactionIterator {
    type Item = Result<CursorItem, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.choose()? {
                Next::Cursor => return self.cursor.next(),
                next => {
                    if matches!(next, Next::Both) {
                        self.cursor.next();
                    }
                    let (key, write) = self.pending.pop_front()?;
                    if let Some(item) = self.pending_item(key, write) {
                        return Some(Ok(item));
                    }
                }
            }
        }
    }
}
