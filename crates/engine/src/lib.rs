//! Storage engine for cairn
//!
//! This crate ties the lower layers into one handle:
//! - [`Engine`]: open/close with a directory lock, MANIFEST check and
//!   value log recovery
//! - [`EngineTxn`]: optimistic transactions with size limits and TTLs
//! - Value log reclamation ([`Engine::reclaim_space`])
//! - Background pruning of expired values and old versions
//!
//! The engine is the only component that knows how the in-memory store, the
//! value log and the commit manager fit together.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod gc;
mod maintenance;
pub mod txn;

pub use cairn_concurrency::WriteBatch;
pub use cairn_storage::{CursorOptions, PruneStats};
pub use config::EngineConfig;
pub use engine::{Engine, LOCK_FILE_NAME};
pub use error::{EngineError, Result};
pub use gc::ReclaimStats;
pub use txn::{expiry_after, EngineIter, EngineTxn, Item};
