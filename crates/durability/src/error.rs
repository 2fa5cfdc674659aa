//! Durability layer errors

use std::io;

use thiserror::Error;

use crate::format::{ManifestError, RecordError};

/// Result type alias for durability operations
pub type Result<T> = std::result::Result<T, DurabilityError>;

/// Errors raised while reading or writing the value log
#[derive(Debug, Error)]
pub enum DurabilityError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// MANIFEST could not be read or written
    #[error("manifest: {0}")]
    Manifest(#[from] ManifestError),

    /// A record could not be encoded
    #[error("record: {0}")]
    Record(#[from] RecordError),

    /// Segment contents are damaged
    #[error("corrupt segment {segment} at offset {offset}: {reason}")]
    Corrupt {
        /// Segment number
        segment: u64,
        /// Byte offset of the first bad record
        offset: u64,
        /// What was wrong
        reason: String,
    },

    /// A segment was written by a newer on-disk format
    #[error("segment format version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version found on disk
        found: u32,
        /// Newest version this build reads
        supported: u32,
    },

    /// The segment is not sealed or does not exist
    #[error("segment {0} cannot be removed")]
    SegmentBusy(u64),
}

impl DurabilityError {
    /// Whether the error means the data on disk is damaged
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            DurabilityError::Corrupt { .. }
                | DurabilityError::Manifest(ManifestError::ChecksumMismatch { .. })
                | DurabilityError::Manifest(ManifestError::InvalidMagic)
                | DurabilityError::Manifest(ManifestError::TooShort)
        )
    }
}
