//! Storage layer errors

use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by the in-memory index
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The store was closed while a reader still held it
    #[error("store is closed")]
    Closed,
}
