//! Lazy query result streams

use std::fmt;

use super::{Entry, Query, QueryResult};
use crate::error::Result;

/// Producer behind a [`Results`] stream
///
/// Implementations hand out results one at a time and release whatever they
/// hold (iterators, worker threads, buffers) in `close`. `close` is called at
/// most once by `Results`.
pub trait ResultSource: Send {
    /// Next result, or `None` once the source is exhausted
    fn next_result(&mut self) -> Option<QueryResult>;

    /// Release resources held by the source
    fn close(&mut self) -> Result<()>;
}

/// Single-pass stream of query results
///
/// Items are either entries or errors; an error marks the point where the
/// producer failed. Closing is idempotent, and dropping the stream closes it.
pub struct Results {
    query: Query,
    source: Box<dyn ResultSource>,
    closed: bool,
}

impl Results {
    /// Wrap a source
    pub fn new(query: Query, source: Box<dyn ResultSource>) -> Self {
        Results {
            query,
            source,
            closed: false,
        }
    }

    /// Stream over already materialized entries
    pub fn from_entries(query: Query, entries: Vec<Entry>) -> Self {
        Self::from_results(query, entries.into_iter().map(Ok).collect())
    }

    /// Stream over already materialized results (entries or errors)
    pub fn from_results(query: Query, results: Vec<QueryResult>) -> Self {
        Results::new(
            query,
            Box::new(BufferedSource {
                items: results.into_iter(),
            }),
        )
    }

    /// The query that produced this stream
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Pull the next result
    ///
    /// Returns `None` when the stream is exhausted or closed.
    pub fn next_result(&mut self) -> Option<QueryResult> {
        if self.closed {
            return None;
        }
        self.source.next_result()
    }

    /// Drain the remaining entries, stopping at the first error
    pub fn rest(mut self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(result) = self.next_result() {
            match result {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    let _ = self.close();
                    return Err(e);
                }
            }
        }
        self.close()?;
        Ok(entries)
    }

    /// Stop the stream and release its resources
    ///
    /// Safe to call any number of times; only the first call reaches the source.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.source.close()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Iterator for Results {
    type Item = QueryResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_result()
    }
}

impl Drop for Results {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Results")
            .field("query", &self.query)
            .field("closed", &self.closed)
            .finish()
    }
}

struct BufferedSource {
    items: std::vec::IntoIter<QueryResult>,
}

impl ResultSource for BufferedSource {
    fn next_result(&mut self) -> Option<QueryResult> {
        self.items.next()
    }

    fn close(&mut self) -> Result<()> {
        // drop whatever was not consumed
        self.items = Vec::new().into_iter();
        Ok(())
    }
}
