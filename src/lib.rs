//! Cairn: a transactional ordered key-value datastore
//!
//! Keys are slash-delimited paths, values are opaque bytes. Everything runs
//! on top of an embedded engine with snapshot-isolated transactions, a value
//! log on disk and an in-memory ordered index.
//!
//! # Quick Start
//!
//! ```no_run
//! use cairn::{Datastore, Key, Options, Query};
//!
//! let ds = Datastore::open("/tmp/cairn", Options::default())?;
//! ds.put(&Key::new("/users/alice"), b"admin")?;
//!
//! let mut txn = ds.new_transaction(false)?;
//! txn.put(&Key::new("/users/bob"), b"guest")?;
//! txn.commit()?;
//!
//! for entry in ds.query(Query::new().with_prefix("/users/"))? {
//!     let entry = entry?;
//!     println!("{} = {:?}", entry.key, entry.value);
//! }
//! # Ok::<(), cairn::Error>(())
//! ```
//!
//! # Architecture
//!
//! - [`Datastore`]: single-call operations, each in an implicit transaction
//! - [`Transaction`]: explicit multi-operation transaction
//! - [`Batch`]: write-only group of operations applied atomically
//! - Queries stream from a worker thread through a bounded channel; see
//!   [`Results`]
//!
//! The datastore traits live in [`traits`] and are implemented by the types
//! above, so code can be written against any conforming datastore.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod batch;
mod datastore;
mod error;
mod gc;
mod options;
mod query;
mod txn;

pub use cairn_core::datastore as traits;
pub use cairn_core::query::naive;
pub use cairn_core::{Entry, Error, ErrorKind, Filter, Key, Op, Order, Query, Result, Results};
pub use cairn_engine::EngineConfig;

pub use batch::Batch;
pub use datastore::Datastore;
pub use options::Options;
pub use txn::Transaction;
