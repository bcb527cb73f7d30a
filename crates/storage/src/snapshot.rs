//! Version-bounded snapshot views
//!
//! A snapshot is a storage handle plus the version it was taken at. Reads go
//! to live storage with `max_version` fixed, so creating one costs nothing
//! and later commits stay invisible to it.

use std::sync::Arc;

use runstore_core::{Key, Result, SnapshotView, Storage, VersionedValue};

/// Snapshot of any [`Storage`] at a fixed version
#[derive(Clone)]
pub struct StorageSnapshot {
    store: Arc<dyn Storage>,
    version: u64,
}

impl StorageSnapshot {
    /// Snapshot `store` at its current version
    pub fn new(store: Arc<dyn Storage>) -> Self {
        let version = store.current_version();
        Self { store, version }
    }

    /// Snapshot `store` at an explicit version
    pub fn at_version(store: Arc<dyn Storage>, version: u64) -> Self {
        Self { store, version }
    }
}

impl std::fmt::Debug for StorageSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSnapshot")
            .field("version", &self.version)
            .finish()
    }
}

impl SnapshotView for StorageSnapshot {
    fn get(&self, key: &Key) -> Result<Option<VersionedValue>> {
        self.store.get_versioned(key, self.version)
    }

    fn key_version(&self, key: &Key) -> Result<u64> {
        self.store.key_version(key, self.version)
    }

    fn scan_range(&self, start: &Key, end: &Key) -> Result<Vec<(Key, VersionedValue)>> {
        self.store.scan_range(start, end, self.version)
    }

    fn scan_prefix(&self, prefix: &Key) -> Result<Vec<(Key, VersionedValue)>> {
        self.store.scan_prefix(prefix, self.version)
    }

    fn version(&self) -> u64 {
        self.version
    }
}
