//! Transaction context for OCC
//!
//! A `TransactionContext` buffers everything an operation does between
//! `begin` and `commit`:
//! - read_set: key -> version observed in the snapshot (0 if absent)
//! - write_set: buffered puts
//! - delete_set: buffered deletes
//!
//! Reads see the transaction's own writes first, then the snapshot. Nothing
//! reaches storage until the manager validates and applies the buffers.

use crate::validation::ValidationResult;
use runstore_core::{Error, Key, SnapshotView, Storage, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

/// Status of a transaction in its lifecycle
///
/// ```text
/// Active ──> Validating ──> Committed
///    │            │
///    └────────────┴──> Aborted
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, reads/writes allowed
    Active,
    /// Transaction is being validated for conflicts
    Validating,
    /// Transaction has been committed successfully
    Committed,
    /// Transaction has been aborted
    Aborted {
        /// Reason for abort
        reason: String,
    },
}

/// Error type for commit failures
#[derive(Debug, Clone)]
pub enum CommitError {
    /// Transaction aborted due to validation conflicts
    ValidationFailed(ValidationResult),
    /// Transaction was not in correct state for commit
    InvalidState(String),
    /// Storage failed while validating or applying
    Storage(String),
}

impl std::fmt::Display for CommitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitError::ValidationFailed(result) => {
                write!(
                    f,
                    "Commit failed: {} conflict(s) detected",
                    result.conflict_count()
                )
            }
            CommitError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            CommitError::Storage(msg) => write!(f, "Storage failure during commit: {}", msg),
        }
    }
}

impl std::error::Error for CommitError {}

impl From<CommitError> for Error {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::ValidationFailed(result) => Error::WriteConflict {
                reason: format!("{} conflict(s) on read set", result.conflict_count()),
            },
            CommitError::InvalidState(msg) => Error::TransactionNotActive(msg),
            CommitError::Storage(msg) => Error::unavailable(msg),
        }
    }
}

/// Transaction context for OCC with snapshot isolation
pub struct TransactionContext {
    /// Unique transaction ID
    pub txn_id: u64,
    /// Storage version when the snapshot was taken
    pub start_version: u64,
    snapshot: Option<Box<dyn SnapshotView>>,
    /// Keys read and the version observed for each
    pub read_set: HashMap<Key, u64>,
    /// Buffered puts
    pub write_set: HashMap<Key, Value>,
    /// Buffered deletes
    pub delete_set: HashSet<Key>,
    /// Current status
    pub status: TransactionStatus,
    start_time: Instant,
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txn_id", &self.txn_id)
            .field("start_version", &self.start_version)
            .field("reads", &self.read_set.len())
            .field("writes", &self.write_set.len())
            .field("deletes", &self.delete_set.len())
            .field("status", &self.status)
            .finish()
    }
}

impl TransactionContext {
    /// Create a transaction without a snapshot
    ///
    /// Reads through such a transaction see only its own writes. Used by
    /// tests that drive the buffers directly.
    pub fn new(txn_id: u64, start_version: u64) -> Self {
        TransactionContext {
            txn_id,
            start_version,
            snapshot: None,
            read_set: HashMap::new(),
            write_set: HashMap::new(),
            delete_set: HashSet::new(),
            status: TransactionStatus::Active,
            start_time: Instant::now(),
        }
    }

    /// Create a transaction reading from `snapshot`
    pub fn with_snapshot(txn_id: u64, snapshot: Box<dyn SnapshotView>) -> Self {
        let start_version = snapshot.version();
        let mut txn = Self::new(txn_id, start_version);
        txn.snapshot = Some(snapshot);
        txn
    }

    // === Reads ===

    /// Get a value, checking own writes and deletes before the snapshot
    ///
    /// Snapshot reads are recorded in the read-set, misses included.
    pub fn get(&mut self, key: &Key) -> runstore_core::Result<Option<Value>> {
        self.ensure_active()?;

        if let Some(value) = self.write_set.get(key) {
            return Ok(Some(value.clone()));
        }
        if self.delete_set.contains(key) {
            return Ok(None);
        }

        let snapshot = match &self.snapshot {
            Some(s) => s,
            None => return Ok(None),
        };

        match snapshot.get(key)? {
            Some(vv) => {
                self.read_set.entry(key.clone()).or_insert(vv.version);
                Ok(Some(vv.value))
            }
            None => {
                let version = snapshot.key_version(key)?;
                self.read_set.entry(key.clone()).or_insert(version);
                Ok(None)
            }
        }
    }

    /// True if `key` has a live value from this transaction's point of view
    pub fn exists(&mut self, key: &Key) -> runstore_core::Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Scan entries with `prefix`, merged with buffered writes, in key order
    pub fn scan_prefix(&mut self, prefix: &Key) -> runstore_core::Result<Vec<(Key, Value)>> {
        self.ensure_active()?;
        let base = match &self.snapshot {
            Some(s) => s.scan_prefix(prefix)?,
            None => Vec::new(),
        };
        let own: Vec<(Key, Value)> = self
            .write_set
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(self.merge_scan(base, own))
    }

    /// Scan entries in `[start, end)`, merged with buffered writes, in key order
    pub fn scan_range(&mut self, start: &Key, end: &Key) -> runstore_core::Result<Vec<(Key, Value)>> {
        self.ensure_active()?;
        let base = match &self.snapshot {
            Some(s) => s.scan_range(start, end)?,
            None => Vec::new(),
        };
        let own: Vec<(Key, Value)> = self
            .write_set
            .iter()
            .filter(|(k, _)| *k >= start && *k < end)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(self.merge_scan(base, own))
    }

    fn merge_scan(
        &mut self,
        base: Vec<(Key, runstore_core::VersionedValue)>,
        own: Vec<(Key, Value)>,
    ) -> Vec<(Key, Value)> {
        let mut merged: BTreeMap<Key, Value> = BTreeMap::new();
        for (key, vv) in base {
            if self.delete_set.contains(&key) {
                continue;
            }
            self.read_set.entry(key.clone()).or_insert(vv.version);
            merged.insert(key, vv.value);
        }
        for (key, value) in own {
            merged.insert(key, value);
        }
        merged.into_iter().collect()
    }

    // === Writes ===

    /// Buffer a put; cancels a pending delete of the same key
    pub fn put(&mut self, key: Key, value: Value) -> runstore_core::Result<()> {
        self.ensure_active()?;
        self.delete_set.remove(&key);
        self.write_set.insert(key, value);
        Ok(())
    }

    /// Buffer a delete; cancels a pending put of the same key
    pub fn delete(&mut self, key: Key) -> runstore_core::Result<()> {
        self.ensure_active()?;
        self.write_set.remove(&key);
        self.delete_set.insert(key);
        Ok(())
    }

    // === State ===

    /// Check if transaction is active
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Check if transaction committed
    pub fn is_committed(&self) -> bool {
        self.status == TransactionStatus::Committed
    }

    /// Check if transaction aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Abort reason, if aborted
    pub fn abort_reason(&self) -> Option<&str> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }

    /// Ensure transaction is active before an operation
    ///
    /// # Errors
    /// Returns `TransactionNotActive` otherwise.
    pub fn ensure_active(&self) -> runstore_core::Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::TransactionNotActive(format!(
                "transaction {} is {:?}",
                self.txn_id, self.status
            )))
        }
    }

    /// Move to Validating
    pub fn mark_validating(&mut self) -> Result<(), CommitError> {
        if !self.is_active() {
            return Err(CommitError::InvalidState(format!(
                "cannot validate transaction {} in state {:?}",
                self.txn_id, self.status
            )));
        }
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    /// Move to Committed
    pub fn mark_committed(&mut self) -> Result<(), CommitError> {
        if self.status != TransactionStatus::Validating {
            return Err(CommitError::InvalidState(format!(
                "cannot commit transaction {} in state {:?}",
                self.txn_id, self.status
            )));
        }
        self.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Abort and drop every buffered write
    ///
    /// # Errors
    /// Returns `InvalidState` if already committed.
    pub fn mark_aborted(&mut self, reason: String) -> Result<(), CommitError> {
        if self.is_committed() {
            return Err(CommitError::InvalidState(format!(
                "cannot abort committed transaction {}",
                self.txn_id
            )));
        }
        self.write_set.clear();
        self.delete_set.clear();
        self.status = TransactionStatus::Aborted { reason };
        Ok(())
    }

    /// Validate against `store` and move to Committed or Aborted
    ///
    /// Does not apply writes; the manager does that under its commit lock.
    pub fn commit(&mut self, store: &dyn Storage) -> Result<(), CommitError> {
        self.mark_validating()?;

        let result = match crate::validation::validate_transaction(self, store) {
            Ok(r) => r,
            Err(e) => {
                let msg = e.to_string();
                let _ = self.mark_aborted(format!("validation read failed: {}", msg));
                return Err(CommitError::Storage(msg));
            }
        };

        if !result.is_valid() {
            let _ = self.mark_aborted(format!(
                "commit failed: {} conflict(s)",
                result.conflict_count()
            ));
            return Err(CommitError::ValidationFailed(result));
        }

        self.mark_committed()
    }

    /// Hand the buffered writes to storage at `version`
    pub fn apply_writes(&self, store: &dyn Storage, version: u64) -> runstore_core::Result<()> {
        let writes: Vec<(Key, Value)> = self
            .write_set
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let deletes: Vec<Key> = self.delete_set.iter().cloned().collect();
        store.apply(writes, deletes, version)
    }

    // === Introspection ===

    /// Number of keys read
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    /// Number of buffered puts
    pub fn write_count(&self) -> usize {
        self.write_set.len()
    }

    /// Number of buffered deletes
    pub fn delete_count(&self) -> usize {
        self.delete_set.len()
    }

    /// True if nothing was written or deleted
    pub fn is_read_only(&self) -> bool {
        self.write_set.is_empty() && self.delete_set.is_empty()
    }

    /// Time since the transaction began
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
