//! Query model
//!
//! A [`Query`] describes a scan over the keyspace: a raw byte prefix, optional
//! filters and orders, offset/limit paging, and flags controlling what each
//! [`Entry`] carries. Queries produce [`Results`], a lazy single-pass stream.
//!
//! # Design Notes
//!
//! - Prefix matching is byte-wise on the key string: prefix `/a/` matches
//!   `/a/b` but not `/a` itself.
//! - Filters and orders are closed enums with a `Function` escape hatch, so
//!   executors can recognise key orders and push them into the engine.
//! - Anything an executor cannot push down is applied by the naive stages in
//!   [`naive`], which work on any `Results`.

mod builder;
pub mod naive;
mod results;

pub use builder::{ResultBuilder, ResultSender};
pub use results::{ResultSource, Results};

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;

/// Result item produced by a query stream
pub type QueryResult = Result<Entry>;

/// One key/value pair produced by a query
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Entry {
    /// Key path
    pub key: String,
    /// Value bytes (empty when the query was keys-only)
    pub value: Vec<u8>,
    /// Absolute expiration, when requested and set
    pub expiration: Option<DateTime<Utc>>,
    /// Value length in bytes, when known
    pub size: Option<usize>,
}

impl Entry {
    /// Entry with a key and value
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        let value = value.into();
        Entry {
            key: key.into(),
            size: Some(value.len()),
            value,
            expiration: None,
        }
    }
}

/// Comparison operator used by filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
}

impl Op {
    /// Whether `ordering` (of the entry's field against the operand) satisfies the operator
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Op::Equal => ordering == Ordering::Equal,
            Op::NotEqual => ordering != Ordering::Equal,
            Op::GreaterThan => ordering == Ordering::Greater,
            Op::GreaterThanOrEqual => ordering != Ordering::Less,
            Op::LessThan => ordering == Ordering::Less,
            Op::LessThanOrEqual => ordering != Ordering::Greater,
        }
    }
}

/// Predicate applied to query entries
#[derive(Clone)]
pub enum Filter {
    /// Compare the entry key with `key`
    KeyCompare {
        /// Operator
        op: Op,
        /// Operand
        key: String,
    },
    /// Compare the entry value bytes with `value`
    ValueCompare {
        /// Operator
        op: Op,
        /// Operand
        value: Vec<u8>,
    },
    /// Keep entries whose key starts with the given bytes
    KeyPrefix(String),
    /// Arbitrary predicate
    Function(Arc<dyn Fn(&Entry) -> bool + Send + Sync>),
}

impl Filter {
    /// Whether the entry passes the filter
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::KeyCompare { op, key } => op.accepts(entry.key.as_str().cmp(key.as_str())),
            Filter::ValueCompare { op, value } => {
                op.accepts(entry.value.as_slice().cmp(value.as_slice()))
            }
            Filter::KeyPrefix(prefix) => entry.key.starts_with(prefix.as_str()),
            Filter::Function(f) => f(entry),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::KeyCompare { op, key } => write!(f, "KEY {:?} {:?}", op, key),
            Filter::ValueCompare { op, value } => write!(f, "VALUE {:?} {:?}", op, value),
            Filter::KeyPrefix(prefix) => write!(f, "PREFIX({:?})", prefix),
            Filter::Function(_) => f.write_str("FILTER(<fn>)"),
        }
    }
}

/// Sort order applied to query entries
#[derive(Clone)]
pub enum Order {
    /// Ascending key order
    ByKey,
    /// Descending key order
    ByKeyDescending,
    /// Ascending value bytes
    ByValue,
    /// Descending value bytes
    ByValueDescending,
    /// Arbitrary comparator
    ByFunction(Arc<dyn Fn(&Entry, &Entry) -> Ordering + Send + Sync>),
}

impl Order {
    /// Compare two entries under this order
    pub fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        match self {
            Order::ByKey => a.key.cmp(&b.key),
            Order::ByKeyDescending => b.key.cmp(&a.key),
            Order::ByValue => a.value.cmp(&b.value),
            Order::ByValueDescending => b.value.cmp(&a.value),
            Order::ByFunction(f) => f(a, b),
        }
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::ByKey => f.write_str("KEY"),
            Order::ByKeyDescending => f.write_str("desc(KEY)"),
            Order::ByValue => f.write_str("VALUE"),
            Order::ByValueDescending => f.write_str("desc(VALUE)"),
            Order::ByFunction(_) => f.write_str("ORDER(<fn>)"),
        }
    }
}

/// Compare two entries under a chain of orders
///
/// The first order dominates; later orders break ties. Entries equal under
/// every order fall back to ascending key order so sorting is deterministic.
pub fn compare_all(orders: &[Order], a: &Entry, b: &Entry) -> Ordering {
    for order in orders {
        let ordering = order.compare(a, b);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.key.cmp(&b.key)
}

/// Declarative description of a scan
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Raw key prefix; empty scans the whole keyspace
    pub prefix: String,
    /// Filters, all of which must match
    pub filters: Vec<Filter>,
    /// Orders; the first dominates
    pub orders: Vec<Order>,
    /// Maximum number of entries (0 = unbounded)
    pub limit: usize,
    /// Number of matching entries to skip
    pub offset: usize,
    /// Skip loading values
    pub keys_only: bool,
    /// Fill [`Entry::expiration`]
    pub return_expirations: bool,
    /// Fill [`Entry::size`] even when values are returned
    pub return_sizes: bool,
}

impl Query {
    /// Query over the whole keyspace
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Add a filter
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add an order
    pub fn with_order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    /// Set the limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the offset
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Only return keys
    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    /// Return expirations with each entry
    pub fn return_expirations(mut self) -> Self {
        self.return_expirations = true;
        self
    }

    /// Return value sizes with each entry
    pub fn return_sizes(mut self) -> Self {
        self.return_sizes = true;
        self
    }
}
