//! Fault injection for exercising substrate failures
//!
//! `FaultInjectingStorage` wraps another store and, when armed, fails reads
//! and/or commits with `StoreUnavailable`. Upper layers are expected to
//! surface these failures rather than swallow them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use runstore_core::{Error, Key, Result, SnapshotView, Storage, Value, VersionedValue};

use crate::snapshot::StorageSnapshot;

/// Storage wrapper that can be told to fail
pub struct FaultInjectingStorage {
    inner: Arc<dyn Storage>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    injected: AtomicUsize,
}

impl FaultInjectingStorage {
    /// Wrap `inner`; no faults are armed initially
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            injected: AtomicUsize::new(0),
        }
    }

    /// Arm or disarm read failures
    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    /// Arm or disarm commit failures
    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    /// Number of failures injected so far
    pub fn injected_faults(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(Error::unavailable(format!("injected {} failure", op)));
        }
        Ok(())
    }
}

impl Storage for FaultInjectingStorage {
    fn get_versioned(&self, key: &Key, max_version: u64) -> Result<Option<VersionedValue>> {
        self.check(&self.fail_reads, "read")?;
        self.inner.get_versioned(key, max_version)
    }

    fn key_version(&self, key: &Key, max_version: u64) -> Result<u64> {
        self.check(&self.fail_reads, "read")?;
        self.inner.key_version(key, max_version)
    }

    fn scan_range(
        &self,
        start: &Key,
        end: &Key,
        max_version: u64,
    ) -> Result<Vec<(Key, VersionedValue)>> {
        self.check(&self.fail_reads, "scan")?;
        self.inner.scan_range(start, end, max_version)
    }

    fn scan_prefix(&self, prefix: &Key, max_version: u64) -> Result<Vec<(Key, VersionedValue)>> {
        self.check(&self.fail_reads, "scan")?;
        self.inner.scan_prefix(prefix, max_version)
    }

    fn current_version(&self) -> u64 {
        self.inner.current_version()
    }

    fn apply(&self, writes: Vec<(Key, Value)>, deletes: Vec<Key>, version: u64) -> Result<()> {
        self.check(&self.fail_writes, "write")?;
        self.inner.apply(writes, deletes, version)
    }

    fn gc(&self, min_version: u64) -> usize {
        self.inner.gc(min_version)
    }

    fn create_snapshot(self: Arc<Self>) -> Box<dyn SnapshotView> {
        // reads through the snapshot still hit the fault switches
        Box::new(StorageSnapshot::new(self))
    }
}
