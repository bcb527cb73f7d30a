//! Transaction manager for coordinating commit operations
//!
//! Provides atomic commit by orchestrating:
//! 1. Validation (first-committer-wins)
//! 2. Storage application (visibility)
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Acquire the commit lock
//! 2. validate_transaction() - Check read-set against storage
//! 3. IF conflicts: abort and return error
//! 4. commit_version = storage.current_version() + 1
//! 5. apply_writes() - Storage publishes every write at commit_version
//! 6. Release the lock and return Ok(commit_version)
//! ```
//!
//! Validation and application happen under one lock, so no other commit can
//! slip in between the check and the write. Readers never take the lock.

use crate::transaction::{CommitError, TransactionContext, TransactionStatus};
use parking_lot::Mutex;
use runstore_core::{Result, Storage};
use std::sync::atomic::{AtomicU64, Ordering};

/// Manages transaction lifecycle and atomic commits
pub struct TransactionManager {
    /// Next transaction ID
    next_txn_id: AtomicU64,

    /// Serializes validate-and-apply
    commit_lock: Mutex<()>,
}

impl TransactionManager {
    /// Create a new transaction manager
    pub fn new() -> Self {
        TransactionManager {
            next_txn_id: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
        }
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Commit a transaction atomically
    ///
    /// # Returns
    /// - Ok(commit_version) on success; read-only transactions return the
    ///   current version without writing
    /// - Err(CommitError) if validation or storage fails
    pub fn commit(
        &self,
        txn: &mut TransactionContext,
        store: &dyn Storage,
    ) -> std::result::Result<u64, CommitError> {
        let _guard = self.commit_lock.lock();

        // Active → Validating → Committed, or → Aborted on conflicts
        txn.commit(store)?;

        if txn.is_read_only() {
            return Ok(store.current_version());
        }

        let commit_version = store.current_version() + 1;

        if let Err(e) = txn.apply_writes(store, commit_version) {
            tracing::error!(
                txn_id = txn.txn_id,
                commit_version = commit_version,
                error = %e,
                "Storage rejected committed writes"
            );
            txn.status = TransactionStatus::Aborted {
                reason: format!("storage apply failed: {}", e),
            };
            return Err(CommitError::Storage(e.to_string()));
        }

        tracing::trace!(
            txn_id = txn.txn_id,
            commit_version = commit_version,
            writes = txn.write_count(),
            deletes = txn.delete_count(),
            "Transaction committed"
        );

        Ok(commit_version)
    }

    /// Explicitly abort a transaction
    ///
    /// All buffered operations are discarded.
    pub fn abort(&self, txn: &mut TransactionContext, reason: String) -> Result<()> {
        txn.mark_aborted(reason).map_err(Into::into)
    }

    /// Commit, making sure the transaction ends Aborted on failure
    pub fn commit_or_rollback(
        &self,
        txn: &mut TransactionContext,
        store: &dyn Storage,
    ) -> std::result::Result<u64, CommitError> {
        match self.commit(txn, store) {
            Ok(version) => Ok(version),
            Err(e) => {
                if !txn.is_aborted() && !txn.is_committed() {
                    let _ = txn.mark_aborted(format!("Commit failed: {}", e));
                }
                Err(e)
            }
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
