//! Durability layer for cairn
//!
//! This crate handles everything that touches disk:
//!
//! - Value log: segmented, append-only log with one record per committed
//!   write set, rotated at a configurable size
//! - Recovery: ordered replay of every segment, with optional truncation of
//!   a torn tail
//! - MANIFEST: database identity and on-disk format version
//! - Binary formats (segment header, CRC32-framed records)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod format;
pub mod value_log;

pub use error::{DurabilityError, Result};
pub use format::{
    CommitRecord, LogOp, Manifest, ManifestError, ManifestManager, RecordError,
    MANIFEST_FILE_NAME, MANIFEST_FORMAT_VERSION, SEGMENT_HEADER_SIZE,
};
pub use value_log::{LoggedRecord, RecoveryStats, ValueLog, ValueLogConfig};
