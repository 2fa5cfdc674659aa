//! Translation from engine errors to datastore errors
//!
//! Nothing above this module sees an [`EngineError`]; every engine sentinel
//! is mapped onto the datastore taxonomy here.

use cairn_core::Error;
use cairn_engine::EngineError;

/// Map an engine error onto the datastore error taxonomy
pub(crate) fn from_engine(err: EngineError) -> Error {
    match err {
        EngineError::KeyNotFound => Error::NotFound,
        EngineError::InvalidArgument(message) => Error::InvalidArgument(message),
        EngineError::UnsupportedVersion { found, supported } => {
            Error::UnsupportedVersion { found, supported }
        }
        EngineError::Conflict { conflicts } => Error::TransactionConflict {
            reason: format!("{} key(s) changed since the transaction started", conflicts),
        },
        EngineError::ReadOnly => Error::ReadOnlyTransaction,
        EngineError::NotActive => Error::TransactionClosed,
        other => Error::engine_with_source(other.to_string(), other),
    }
}
