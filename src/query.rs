//! Query execution over engine iterators
//!
//! A query runs on one worker thread that walks an engine iterator and feeds
//! a bounded channel. What the engine can do natively is pushed into the
//! iterator; everything else is layered on the stream as naive stages:
//!
//! ```text
//! leading order          iterator      worker does                 naive stages
//! none / ByKey           forward       filters, offset, limit      -
//! ByKeyDescending        reverse       filters, offset, limit      -
//! anything else          forward       filters                     order, offset, limit
//! ```
//!
//! Keys are unique, so once the leading order is a key order every later
//! order is a no-op and the whole chain is dropped.
//!
//! # Ownership
//!
//! The iterator owns its snapshot and a copy of the transaction's pending
//! writes, so a stream stays valid after its transaction commits or is
//! discarded. A query issued through the datastore hands its implicit
//! transaction to the worker, which discards it once the iterator is done.

use cairn_core::query::naive::{naive_limit, naive_offset, naive_order};
use cairn_core::{Entry, Error, Filter, Order, Query, ResultBuilder, ResultSender, Results};
use cairn_engine::{CursorOptions, EngineIter, EngineTxn, Item};
use chrono::{TimeZone, Utc};
use tracing::debug;

use crate::error::from_engine;

const WORKER_NAME: &str = "cairn-query";

/// How a query is split between the engine and the naive stages
#[derive(Debug)]
struct Plan {
    reverse: bool,
    /// Orders left for the naive order stage
    orders: Vec<Order>,
}

impl Plan {
    fn new(query: &Query) -> Self {
        match query.orders.first() {
            Some(Order::ByKey) => Plan {
                reverse: false,
                orders: Vec::new(),
            },
            Some(Order::ByKeyDescending) => Plan {
                reverse: true,
                orders: Vec::new(),
            },
            _ => Plan {
                reverse: false,
                orders: query.orders.clone(),
            },
        }
    }

    /// Whether offset and limit can be counted by the worker
    fn streams(&self) -> bool {
        self.orders.is_empty()
    }
}

/// What the worker applies to each item
struct WorkerSpec {
    filters: Vec<Filter>,
    offset: usize,
    limit: usize,
    keys_only: bool,
    return_sizes: bool,
    return_expirations: bool,
}

/// Run `query` against `txn`'s view; the caller keeps the transaction
pub(crate) fn execute(txn: &EngineTxn, query: Query, capacity: usize) -> cairn_core::Result<Results> {
    let plan = Plan::new(&query);
    let iter = open_iter(txn, &query, &plan)?;
    spawn(iter, None, query, plan, capacity)
}

/// Run `query` against `txn`'s view and hand the transaction to the worker
///
/// The worker discards `txn` after releasing the iterator, whether the
/// stream ran to the end or was closed early.
pub(crate) fn execute_owned(
    mut txn: EngineTxn,
    query: Query,
    capacity: usize,
) -> cairn_core::Result<Results> {
    let plan = Plan::new(&query);
    let iter = match open_iter(&txn, &query, &plan) {
        Ok(iter) => iter,
        Err(e) => {
            txn.discard();
            return Err(e);
        }
    };
    spawn(iter, Some(txn), query, plan, capacity)
}

fn open_iter(txn: &EngineTxn, query: &Query, plan: &Plan) -> cairn_core::Result<EngineIter> {
    let options = CursorOptions {
        prefix: query.prefix.as_bytes().to_vec(),
        reverse: plan.reverse,
        keys_only: query.keys_only,
        ..Default::default()
    };
    txn.iter(options).map_err(from_engine)
}

fn spawn(
    iter: EngineIter,
    owner: Option<EngineTxn>,
    query: Query,
    plan: Plan,
    capacity: usize,
) -> cairn_core::Result<Results> {
    let streams = plan.streams();
    let spec = WorkerSpec {
        filters: query.filters.clone(),
        offset: if streams { query.offset } else { 0 },
        limit: if streams { query.limit } else { 0 },
        keys_only: query.keys_only,
        return_sizes: query.return_sizes,
        return_expirations: query.return_expirations,
    };
    let (offset, limit) = (query.offset, query.limit);

    debug!(
        target: "cairn::query",
        prefix = %query.prefix,
        reverse = plan.reverse,
        naive_orders = plan.orders.len(),
        implicit = owner.is_some(),
        "Query planned"
    );

    let results = ResultBuilder::new(query, capacity).spawn(WORKER_NAME, move |sender| {
        let emitted = produce(iter, &spec, &sender);
        if let Some(mut txn) = owner {
            txn.discard();
        }
        debug!(target: "cairn::query", emitted, cancelled = sender.is_closing(), "Query worker finished");
    })?;

    if streams {
        return Ok(results);
    }
    let results = naive_order(results, plan.orders);
    let results = naive_offset(results, offset);
    Ok(naive_limit(results, limit))
}

/// Walk `iter` until it ends, the limit is reached or the consumer goes away
///
/// Takes the iterator by value so it is released before the caller touches
/// the owning transaction. Returns the number of entries sent.
fn produce(iter: EngineIter, spec: &WorkerSpec, sender: &ResultSender) -> usize {
    let mut skipped = 0;
    let mut sent = 0;

    for item in iter {
        let entry = match item.map_err(from_engine).and_then(|item| to_entry(item, spec)) {
            Ok(entry) => entry,
            Err(e) => {
                sender.send(Err(e));
                return sent;
            }
        };
        if !spec.filters.iter().all(|f| f.matches(&entry)) {
            continue;
        }
        if skipped < spec.offset {
            skipped += 1;
            continue;
        }
        if !sender.send(Ok(entry)) {
            return sent;
        }
        sent += 1;
        if spec.limit > 0 && sent >= spec.limit {
            break;
        }
    }
    sent
}

fn to_entry(item: Item, spec: &WorkerSpec) -> cairn_core::Result<Entry> {
    let key = std::str::from_utf8(item.key())
        .map_err(|e| Error::InvalidArgument(format!("stored key is not valid UTF-8: {}", e)))?
        .to_string();

    let expiration = match (spec.return_expirations, item.expires_at()) {
        (true, Some(secs)) => Some(
            Utc.timestamp_opt(secs as i64, 0)
                .single()
                .ok_or_else(|| Error::engine(format!("expiration {} out of range", secs)))?,
        ),
        _ => None,
    };

    Ok(Entry {
        key,
        value: if spec.keys_only {
            Vec::new()
        } else {
            item.value().map(<[u8]>::to_vec).unwrap_or_default()
        },
        expiration,
        size: (spec.keys_only || spec.return_sizes).then(|| item.value_size()),
    })
}
