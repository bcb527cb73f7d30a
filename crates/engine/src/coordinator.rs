//! Transaction coordinator for managing transaction lifecycle
//!
//! The TransactionCoordinator wraps TransactionManager and adds:
//! - Snapshot creation for new transactions
//! - Tracking of live snapshot versions, which bounds garbage collection
//! - Transaction metrics (started, committed, aborted, conflicts)
//! - CommitError to Error conversion
//!
//! ## Garbage collection
//!
//! Every successful commit asks storage to reclaim entries older than the
//! GC horizon: the oldest snapshot a live transaction still reads, or the
//! current version when none is open. A snapshot is registered under the
//! same lock that computes the horizon, so no new transaction can start
//! below it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use runstore_concurrency::{CommitError, TransactionContext, TransactionManager};
use runstore_core::{Key, Result, SnapshotView, Storage, VersionedValue};
use tracing::{debug, trace};

/// Snapshot versions held by live transactions, with a count per version
#[derive(Debug, Default)]
struct ActiveSnapshots {
    versions: Mutex<BTreeMap<u64, usize>>,
}

impl ActiveSnapshots {
    fn release(&self, version: u64) {
        let mut versions = self.versions.lock();
        if let Some(count) = versions.get_mut(&version) {
            *count -= 1;
            if *count == 0 {
                versions.remove(&version);
            }
        }
    }
}

/// Snapshot that unregisters itself when its transaction is dropped
struct TrackedSnapshot {
    inner: Box<dyn SnapshotView>,
    active: Arc<ActiveSnapshots>,
}

impl SnapshotView for TrackedSnapshot {
    fn get(&self, key: &Key) -> Result<Option<VersionedValue>> {
        self.inner.get(key)
    }

    fn key_version(&self, key: &Key) -> Result<u64> {
        self.inner.key_version(key)
    }

    fn scan_range(&self, start: &Key, end: &Key) -> Result<Vec<(Key, VersionedValue)>> {
        self.inner.scan_range(start, end)
    }

    fn scan_prefix(&self, prefix: &Key) -> Result<Vec<(Key, VersionedValue)>> {
        self.inner.scan_prefix(prefix)
    }

    fn version(&self) -> u64 {
        self.inner.version()
    }
}

impl Drop for TrackedSnapshot {
    fn drop(&mut self) {
        self.active.release(self.inner.version());
    }
}

/// Transaction coordinator for the database
///
/// # Memory Ordering
///
/// The metric counters use Relaxed ordering. They are observational only and
/// synchronize nothing else.
pub struct TransactionCoordinator {
    manager: TransactionManager,
    active: Arc<ActiveSnapshots>,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
    total_conflicts: AtomicU64,
}

impl TransactionCoordinator {
    /// Create a coordinator with zeroed metrics
    pub fn new() -> Self {
        Self {
            manager: TransactionManager::new(),
            active: Arc::new(ActiveSnapshots::default()),
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
            total_conflicts: AtomicU64::new(0),
        }
    }

    /// Start a new transaction on a snapshot of `storage`
    pub fn start_transaction(&self, storage: &Arc<dyn Storage>) -> TransactionContext {
        let txn_id = self.manager.next_txn_id();
        let snapshot = {
            let mut versions = self.active.versions.lock();
            let snapshot = Arc::clone(storage).create_snapshot();
            *versions.entry(snapshot.version()).or_insert(0) += 1;
            snapshot
        };
        self.total_started.fetch_add(1, Ordering::Relaxed);
        trace!(target: "runstore::txn", txn_id, version = snapshot.version(), "Transaction started");
        let tracked = TrackedSnapshot {
            inner: snapshot,
            active: Arc::clone(&self.active),
        };
        TransactionContext::with_snapshot(txn_id, Box::new(tracked))
    }

    /// Oldest version a live transaction may still read
    ///
    /// Falls back to the current storage version when no transaction is open.
    pub fn gc_horizon(&self, store: &dyn Storage) -> u64 {
        let versions = self.active.versions.lock();
        versions
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| store.current_version())
    }

    /// Reclaim storage entries below the GC horizon
    pub fn collect_garbage(&self, store: &dyn Storage) -> usize {
        let horizon = self.gc_horizon(store);
        let reclaimed = store.gc(horizon);
        if reclaimed > 0 {
            trace!(target: "runstore::txn", horizon, reclaimed, "Reclaimed versions");
        }
        reclaimed
    }

    /// Commit a transaction through the concurrency layer
    ///
    /// Records commit/abort metrics and converts `CommitError` into the
    /// crate error (`WriteConflict` for validation failures).
    pub fn commit(&self, txn: &mut TransactionContext, store: &dyn Storage) -> Result<u64> {
        match self.manager.commit_or_rollback(txn, store) {
            Ok(version) => {
                self.total_committed.fetch_add(1, Ordering::Relaxed);
                self.collect_garbage(store);
                Ok(version)
            }
            Err(e) => {
                self.record_abort();
                if matches!(e, CommitError::ValidationFailed(_)) {
                    self.total_conflicts.fetch_add(1, Ordering::Relaxed);
                }
                debug!(target: "runstore::txn", txn_id = txn.txn_id, error = %e, "Transaction aborted");
                Err(e.into())
            }
        }
    }

    /// Record an abort that happened outside `commit` (closure error)
    pub fn record_abort(&self) {
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get transaction metrics
    pub fn metrics(&self) -> TransactionMetrics {
        let started = self.total_started.load(Ordering::Relaxed);
        let committed = self.total_committed.load(Ordering::Relaxed);

        TransactionMetrics {
            total_started: started,
            total_committed: committed,
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            total_conflicts: self.total_conflicts.load(Ordering::Relaxed),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for TransactionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Transaction metrics
#[derive(Debug, Clone)]
pub struct TransactionMetrics {
    /// Total number of transactions started
    pub total_started: u64,
    /// Total number of transactions committed
    pub total_committed: u64,
    /// Total number of transactions aborted, for any reason
    pub total_aborted: u64,
    /// Aborts caused by read-set validation failures
    pub total_conflicts: u64,
    /// Commit success rate (committed / started)
    pub commit_rate: f64,
}

impl TransactionMetrics {
    /// Total transactions that completed (committed + aborted)
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted
    }

    /// Abort rate (aborted / started)
    pub fn abort_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_aborted as f64 / self.total_started as f64
        } else {
            0.0
        }
    }
}
