//! Engine error type
//!
//! Lower-layer errors are folded into `EngineError` here so the engine's
//! callers deal with one type. Format version mismatches from either the
//! MANIFEST or a segment header surface as [`EngineError::UnsupportedVersion`].

use std::io;
use std::path::PathBuf;

use cairn_concurrency::{CommitError, TxnError};
use cairn_durability::{DurabilityError, ManifestError};
use cairn_storage::StorageError;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors reported by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// No live value for the key
    #[error("key not found")]
    KeyNotFound,

    /// Value log reclamation found no segment worth rewriting
    #[error("value log reclamation: no segment reached the discard ratio")]
    NoRewrite,

    /// Bad argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// On-disk data written by a newer format
    #[error("on-disk format version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version found on disk
        found: u32,
        /// Newest version this build reads
        supported: u32,
    },

    /// Commit validation failed; retrying the transaction may succeed
    #[error("transaction conflict on {conflicts} key(s)")]
    Conflict {
        /// Number of conflicting reads
        conflicts: usize,
    },

    /// The transaction outgrew its size limits
    #[error("transaction too big: {ops} ops, {bytes} bytes")]
    TxnTooBig {
        /// Operations the write would have produced
        ops: usize,
        /// Bytes the write would have produced
        bytes: usize,
    },

    /// Write through a read-only transaction
    #[error("transaction is read-only")]
    ReadOnly,

    /// Transaction used after commit or discard
    #[error("transaction is no longer active")]
    NotActive,

    /// Another handle owns the directory
    #[error("database at '{}' is already in use", .0.display())]
    Locked(PathBuf),

    /// The engine was closed
    #[error("engine is closed")]
    Closed,

    /// Invalid or unreadable configuration
    #[error("config: {0}")]
    Config(String),

    /// Value log or MANIFEST failure
    #[error(transparent)]
    Durability(DurabilityError),

    /// Filesystem failure outside the value log
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Whether retrying the transaction may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }
}

impl From<DurabilityError> for EngineError {
    fn from(e: DurabilityError) -> Self {
        match e {
            DurabilityError::UnsupportedVersion { found, supported }
            | DurabilityError::Manifest(ManifestError::UnsupportedVersion { found, supported }) => {
                EngineError::UnsupportedVersion { found, supported }
            }
            other => EngineError::Durability(other),
        }
    }
}

impl From<ManifestError> for EngineError {
    fn from(e: ManifestError) -> Self {
        DurabilityError::from(e).into()
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Closed => EngineError::Closed,
        }
    }
}

impl From<TxnError> for EngineError {
    fn from(e: TxnError) -> Self {
        match e {
            TxnError::NotActive => EngineError::NotActive,
            TxnError::ReadOnly => EngineError::ReadOnly,
            TxnError::TooBig { ops, bytes } => EngineError::TxnTooBig { ops, bytes },
            TxnError::Storage(e) => e.into(),
        }
    }
}

impl From<CommitError> for EngineError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::Conflict(result) => EngineError::Conflict {
                conflicts: result.conflict_count(),
            },
            CommitError::InvalidState(_) => EngineError::NotActive,
            CommitError::Log(e) => e.into(),
            CommitError::Storage(e) => e.into(),
        }
    }
}
