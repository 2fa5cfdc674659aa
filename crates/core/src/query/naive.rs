//! Naive post-processing stages
//!
//! Each stage wraps a [`Results`] stream and returns a new one. Filters,
//! offsets and limits stay lazy; an order stage has to materialize the whole
//! remaining stream before it can emit anything.

use super::{compare_all, Filter, Order, Query, QueryResult, ResultSource, Results};
use crate::error::Result;

/// Drop entries that do not match `filter`
///
/// Errors pass through untouched.
pub fn naive_filter(results: Results, filter: Filter) -> Results {
    let query = results.query().clone();
    Results::new(
        query,
        Box::new(FilterSource {
            inner: results,
            filter,
        }),
    )
}

/// Sort the remaining stream by the comparator chain `orders`
///
/// The first pull drains the inner stream. If the inner stream fails, the
/// error is emitted and nothing else.
pub fn naive_order(results: Results, orders: Vec<Order>) -> Results {
    if orders.is_empty() {
        return results;
    }
    let query = results.query().clone();
    Results::new(
        query,
        Box::new(OrderSource {
            inner: results,
            orders,
            sorted: None,
        }),
    )
}

/// Skip the first `offset` entries
pub fn naive_offset(results: Results, offset: usize) -> Results {
    if offset == 0 {
        return results;
    }
    let query = results.query().clone();
    Results::new(
        query,
        Box::new(OffsetSource {
            inner: results,
            remaining: offset,
        }),
    )
}

/// Stop after `limit` entries (0 = unbounded)
pub fn naive_limit(results: Results, limit: usize) -> Results {
    if limit == 0 {
        return results;
    }
    let query = results.query().clone();
    Results::new(
        query,
        Box::new(LimitSource {
            inner: results,
            remaining: limit,
        }),
    )
}

/// Apply every part of `query` to an unprocessed stream
///
/// Prefix, filters, orders, offset and limit are applied in that order. Used by
/// executors that cannot push any of the query into their backend.
pub fn naive_query_apply(query: &Query, mut results: Results) -> Results {
    if !query.prefix.is_empty() {
        results = naive_filter(results, Filter::KeyPrefix(query.prefix.clone()));
    }
    for filter in &query.filters {
        results = naive_filter(results, filter.clone());
    }
    results = naive_order(results, query.orders.clone());
    results = naive_offset(results, query.offset);
    naive_limit(results, query.limit)
}

struct FilterSource {
    inner: Results,
    filter: Filter,
}

impl ResultSource for FilterSource {
    fn next_result(&mut self) -> Option<QueryResult> {
        loop {
            match self.inner.next_result()? {
                Ok(entry) if !self.filter.matches(&entry) => continue,
                other => return Some(other),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

struct OrderSource {
    inner: Results,
    orders: Vec<Order>,
    sorted: Option<std::vec::IntoIter<QueryResult>>,
}

impl OrderSource {
    fn materialize(&mut self) -> Vec<QueryResult> {
        let mut entries = Vec::new();
        while let Some(result) = self.inner.next_result() {
            match result {
                Ok(entry) => entries.push(entry),
                Err(e) => return vec![Err(e)],
            }
        }
        entries.sort_by(|a, b| compare_all(&self.orders, a, b));
        entries.into_iter().map(Ok).collect()
    }
}

impl ResultSource for OrderSource {
    fn next_result(&mut self) -> Option<QueryResult> {
        if self.sorted.is_none() {
            let items = self.materialize();
            self.sorted = Some(items.into_iter());
        }
        self.sorted.as_mut()?.next()
    }

    fn close(&mut self) -> Result<()> {
        self.sorted = None;
        self.inner.close()
    }
}

struct OffsetSource {
    inner: Results,
    remaining: usize,
}

impl ResultSource for OffsetSource {
    fn next_result(&mut self) -> Option<QueryResult> {
        while self.remaining > 0 {
            match self.inner.next_result()? {
                Ok(_) => self.remaining -= 1,
                Err(e) => return Some(Err(e)),
            }
        }
        self.inner.next_result()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

struct LimitSource {
    inner: Results,
    remaining: usize,
}

impl ResultSource for LimitSource {
    fn next_result(&mut self) -> Option<QueryResult> {
        if self.remaining == 0 {
            return None;
        }
        let result = self.inner.next_result()?;
        if result.is_ok() {
            self.remaining -= 1;
        }
        Some(result)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
