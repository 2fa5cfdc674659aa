//! Transaction validation for OCC
//!
//! Rules:
//! - First-committer-wins based on the read set, not the write set
//! - Blind writes (write without read) do not conflict
//! - Write skew is allowed
//!
//! A key's version is its live version: the commit version of the newest
//! value, or 0 when the key is absent or deleted. Deleting and recreating a
//! key therefore conflicts, while deleting an already absent key does not.

use cairn_storage::{OrderedStore, StorageError};

use crate::transaction::TransactionContext;

/// Types of conflicts detected during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// A key read by the transaction changed before it committed
    ReadWriteConflict {
        /// The key that has a conflict
        key: Vec<u8>,
        /// Version recorded in the read set
        read_version: u64,
        /// Live version at validation time
        current_version: u64,
    },
}

/// Result of transaction validation
///
/// A transaction commits only if [`is_valid`](Self::is_valid) holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// A successful validation result
    pub fn ok() -> Self {
        ValidationResult::default()
    }

    /// Whether validation passed
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }
}

/// Validate the read set of `txn` against the current state of `store`
///
/// Must run under the commit lock so no commit lands between validation and
/// version allocation.
pub fn validate_transaction(
    txn: &TransactionContext,
    store: &OrderedStore,
) -> Result<ValidationResult, StorageError> {
    let mut result = ValidationResult::ok();
    for (key, &read_version) in txn.read_set() {
        let current_version = store.live_version(key)?;
        if current_version != read_version {
            result.conflicts.push(ConflictType::ReadWriteConflict {
                key: key.clone(),
                read_version,
                current_version,
            });
        }
    }
    Ok(result)
}
