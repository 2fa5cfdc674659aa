//! In-memory MVCC index for cairn
//!
//! This crate holds the ordered, versioned key index that every read goes
//! through:
//! - `OrderedStore`: BTreeMap of version chains behind one RwLock
//! - `Snapshot`: registered point-in-time view, released on drop
//! - `Cursor`: paged prefix iteration, forward or reverse
//! - `TtlIndex`: expiry second to keys, for pruning
//!
//! The store knows nothing about files. The durability crate replays the
//! value log into it at open and the engine applies each commit to it after
//! the log write.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chain;
pub mod cursor;
pub mod error;
pub mod snapshot;
pub mod store;
pub mod stored_value;
pub mod ttl;

pub use chain::VersionChain;
pub use cursor::{prefix_successor, Cursor, CursorItem, CursorOptions, DEFAULT_PAGE_SIZE};
pub use error::{Result, StorageError};
pub use snapshot::Snapshot;
pub use store::{OrderedStore, PruneStats, WriteOp};
pub use stored_value::{now_secs, StoredValue};
pub use ttl::TtlIndex;
