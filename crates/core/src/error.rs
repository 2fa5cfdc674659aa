//! Error types for cairn datastores
//!
//! This is the error taxonomy every datastore implementation reports to its
//! callers. Backends translate their own error identities into these variants
//! at their boundary; callers never see backend-specific errors.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Result type alias for datastore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Key absent
    NotFound,
    /// Value of the wrong shape at a dynamically typed boundary
    InvalidType,
    /// Bad argument or misuse of a handle
    InvalidArgument,
    /// I/O, corruption or resource exhaustion in the backend
    EngineFailure,
    /// On-disk data written by a newer, incompatible version
    UnsupportedVersion,
    /// Commit-time isolation violation; the operation may be retried
    TransactionConflict,
    /// Operation the backend does not support
    Unimplemented,
}

/// Errors reported by datastores
#[derive(Debug, Error)]
pub enum Error {
    /// Key not found
    #[error("datastore: key not found")]
    NotFound,

    /// Value was not a byte sequence
    #[error("datastore: invalid type for value")]
    InvalidType,

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Mutation attempted through a read-only transaction
    #[error("cannot modify data through a read-only transaction")]
    ReadOnlyTransaction,

    /// Transaction or batch used after commit, discard or cancel
    #[error("transaction is closed")]
    TransactionClosed,

    /// Backend failure (I/O, corruption, resource exhaustion)
    #[error("engine failure: {message}")]
    Engine {
        /// Human-readable description from the backend
        message: String,
        /// Underlying cause, when one is available
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Data on disk was written by a newer format version
    #[error(
        "unsupported on-disk format version {found} (this build supports up to {supported}); \
         open the directory with a newer release or export and re-import the data"
    )]
    UnsupportedVersion {
        /// Version found on disk
        found: u32,
        /// Highest version this build understands
        supported: u32,
    },

    /// Commit failed because a conflicting transaction committed first
    #[error("transaction conflict: {reason}; please retry")]
    TransactionConflict {
        /// Description of the conflict
        reason: String,
    },

    /// Operation not implemented by this backend
    #[error("operation not implemented: {0}")]
    Unimplemented(String),
}

impl Error {
    /// Build an engine failure from a message
    pub fn engine(message: impl Into<String>) -> Self {
        Error::Engine {
            message: message.into(),
            source: None,
        }
    }

    /// Build an engine failure that keeps its cause
    pub fn engine_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Engine {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound => ErrorKind::NotFound,
            Error::InvalidType => ErrorKind::InvalidType,
            Error::InvalidArgument(_) | Error::ReadOnlyTransaction | Error::TransactionClosed => {
                ErrorKind::InvalidArgument
            }
            Error::Engine { .. } => ErrorKind::EngineFailure,
            Error::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            Error::TransactionConflict { .. } => ErrorKind::TransactionConflict,
            Error::Unimplemented(_) => ErrorKind::Unimplemented,
        }
    }

    /// Whether this error is [`Error::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    /// Whether retrying the whole transaction may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransactionConflict { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::engine_with_source("I/O error", e)
    }
}
