//! Core types for cairn
//!
//! This crate defines the vocabulary shared by every cairn crate and by
//! callers of the datastore:
//! - [`Key`]: slash-delimited hierarchical keys
//! - [`Error`]: the datastore error taxonomy
//! - [`query`]: queries, filters, orders and lazy result streams
//! - [`datastore`]: the traits a datastore, its transactions and batches implement
//!
//! With the `testing` feature, [`testing`] provides a conformance suite that any
//! [`Datastore`] implementation can run.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod datastore;
pub mod error;
pub mod key;
pub mod query;
#[cfg(feature = "testing")]
pub mod testing;

pub use datastore::{
    Batch, Batching, Datastore, GcDatastore, PersistentDatastore, TtlDatastore, Txn,
    TxnDatastore, TxnTtl,
};
pub use error::{Error, ErrorKind, Result};
pub use key::Key;
pub use query::{Entry, Filter, Op, Order, Query, QueryResult, ResultBuilder, ResultSender, Results};
