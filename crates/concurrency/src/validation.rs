//! Transaction validation for OCC
//!
//! Rules:
//! - First-committer-wins based on the READ-SET, not the write-set
//! - Blind writes (write without read) do NOT conflict
//! - Read-only transactions always commit (they only observe their snapshot)
//! - Write skew is allowed
//!
//! Every engine operation reads the primary record it is about to change, so
//! two operations racing on the same run always overlap in their read-sets.

use crate::transaction::TransactionContext;
use runstore_core::{Key, Result, Storage};
use std::collections::HashMap;

/// Types of conflicts that can occur during transaction validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// Key was read at one version but the current version differs
    ReadWriteConflict {
        /// The key that has a conflict
        key: Key,
        /// Version recorded in read_set when read
        read_version: u64,
        /// Current version in storage at validation time
        current_version: u64,
    },
}

/// Result of transaction validation
///
/// Accumulates all conflicts found during validation.
/// A transaction commits only if is_valid() returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        Self::default()
    }

    /// Create a validation result with a single conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        ValidationResult {
            conflicts: vec![conflict],
        }
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }
}

/// Validate the read-set against current storage state
///
/// For each key in `read_set`, compares the recorded version with the newest
/// entry in storage (tombstones included, 0 for never written).
///
/// # Errors
///
/// Storage failures abort validation; committing on a partial check would
/// be unsound.
pub fn validate_read_set(
    read_set: &HashMap<Key, u64>,
    store: &dyn Storage,
) -> Result<ValidationResult> {
    let mut result = ValidationResult::ok();

    for (key, read_version) in read_set {
        let current_version = store.key_version(key, u64::MAX)?;
        if current_version != *read_version {
            result.conflicts.push(ConflictType::ReadWriteConflict {
                key: key.clone(),
                read_version: *read_version,
                current_version,
            });
        }
    }

    Ok(result)
}

/// Validate a complete transaction against current storage state
///
/// Read-only transactions skip validation entirely.
pub fn validate_transaction(
    txn: &TransactionContext,
    store: &dyn Storage,
) -> Result<ValidationResult> {
    if txn.is_read_only() {
        return Ok(ValidationResult::ok());
    }
    validate_read_set(&txn.read_set, store)
}
