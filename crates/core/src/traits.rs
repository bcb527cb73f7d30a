//! Core traits for storage and snapshot abstraction
//!
//! This module defines the Storage and SnapshotView traits that let the
//! concurrency and engine layers run over any ordered, versioned key-value
//! substrate.

use crate::error::Result;
use crate::key::Key;
use crate::value::{Value, VersionedValue};
use std::sync::Arc;

/// Ordered multi-version key-value substrate
///
/// Every write carries the commit version of the transaction that produced
/// it. Reads are bounded by a `max_version`, which is how snapshots see a
/// stable view while later commits land.
///
/// Thread safety: All methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
pub trait Storage: Send + Sync {
    /// Get the live value at or before `max_version`
    ///
    /// Returns None if the key never existed or its newest visible entry is
    /// a tombstone.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the substrate fails.
    fn get_versioned(&self, key: &Key, max_version: u64) -> Result<Option<VersionedValue>>;

    /// Version of the newest entry for `key` at or before `max_version`
    ///
    /// Tombstones count. Returns 0 if the key was never written. This is
    /// what read-set validation compares against.
    fn key_version(&self, key: &Key, max_version: u64) -> Result<u64>;

    /// Live entries in `[start, end)` at or before `max_version`, in key order
    fn scan_range(
        &self,
        start: &Key,
        end: &Key,
        max_version: u64,
    ) -> Result<Vec<(Key, VersionedValue)>>;

    /// Live entries starting with `prefix` at or before `max_version`, in key order
    fn scan_prefix(&self, prefix: &Key, max_version: u64) -> Result<Vec<(Key, VersionedValue)>>;

    /// Highest version whose writes are fully visible
    fn current_version(&self) -> u64;

    /// Atomically apply a committed transaction's writes
    ///
    /// All puts and deletes get `version`. Readers observe either none or
    /// all of them; `current_version` advances only after the last one.
    fn apply(&self, writes: Vec<(Key, Value)>, deletes: Vec<Key>, version: u64) -> Result<()>;

    /// Reclaim entries no snapshot at or after `min_version` can observe
    ///
    /// Per key, the newest entry at or before `min_version` survives along
    /// with everything newer. A key left with only a tombstone at or before
    /// `min_version` is removed, so its `key_version` drops back to 0.
    /// Returns the number of entries reclaimed.
    fn gc(&self, min_version: u64) -> usize;

    /// Snapshot of this store at its current version
    fn create_snapshot(self: Arc<Self>) -> Box<dyn SnapshotView>;
}

/// Snapshot view abstraction for snapshot isolation
///
/// Provides a version-bounded read view of storage.
///
/// Thread safety: Must be safe to pass between threads (Send + Sync).
pub trait SnapshotView: Send + Sync {
    /// Get value from snapshot
    fn get(&self, key: &Key) -> Result<Option<VersionedValue>>;

    /// Version of the newest entry for `key` in this snapshot, tombstones included
    fn key_version(&self, key: &Key) -> Result<u64>;

    /// Live entries in `[start, end)` as of the snapshot
    fn scan_range(&self, start: &Key, end: &Key) -> Result<Vec<(Key, VersionedValue)>>;

    /// Live entries starting with `prefix` as of the snapshot
    fn scan_prefix(&self, prefix: &Key) -> Result<Vec<(Key, VersionedValue)>>;

    /// Get snapshot version
    fn version(&self) -> u64;
}
