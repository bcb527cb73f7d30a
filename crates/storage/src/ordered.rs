//! OrderedStore: in-memory MVCC backend over a BTreeMap
//!
//! This module implements the Storage trait using:
//! - `BTreeMap<Key, VersionChain>` for ordered keys with version history
//! - `parking_lot::RwLock` for thread-safe access
//! - `AtomicU64` for the visible version
//!
//! # Design Notes
//!
//! - **Version chains**: each key keeps its entries newest-first, so a
//!   snapshot read walks the chain until it meets a version it may see.
//! - **Tombstones**: deletes push a tombstone entry, so older snapshots keep
//!   seeing the deleted value.
//! - **Reclamation**: keys that gained history or a tombstone are remembered,
//!   and `gc` trims only those. A key whose sole remaining entry is an old
//!   tombstone leaves the map entirely. A transaction that read that
//!   tombstone sees its version change and retries.
//! - **Atomic apply**: a commit's writes land under one write lock and the
//!   visible version is published after the last one, so no reader ever
//!   observes half a transaction.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use runstore_core::{Error, Key, Result, SnapshotView, Storage, Value, VersionedValue};

use crate::snapshot::StorageSnapshot;
use crate::stored_value::StoredValue;

/// Per-key version history, newest first
#[derive(Debug, Clone, Default)]
pub struct VersionChain {
    versions: VecDeque<StoredValue>,
}

impl VersionChain {
    /// Create a new version chain with a single version
    pub fn new(value: StoredValue) -> Self {
        let mut versions = VecDeque::with_capacity(4);
        versions.push_front(value);
        Self { versions }
    }

    /// Add a new version (must be newer than existing versions)
    #[inline]
    pub fn push(&mut self, value: StoredValue) {
        debug_assert!(
            self.latest()
                .map_or(true, |sv| sv.version() <= value.version()),
            "version chain must grow monotonically"
        );
        self.versions.push_front(value);
    }

    /// Get the entry at or before the given max_version
    pub fn get_at_version(&self, max_version: u64) -> Option<&StoredValue> {
        self.versions.iter().find(|sv| sv.version() <= max_version)
    }

    /// Get the latest entry
    #[inline]
    pub fn latest(&self) -> Option<&StoredValue> {
        self.versions.front()
    }

    /// Drop entries shadowed for every snapshot at or after `min_version`
    ///
    /// The newest entry at or before `min_version` stays. Returns how many
    /// entries were removed.
    pub fn gc(&mut self, min_version: u64) -> usize {
        let mut removed = 0;
        // Newest first: the oldest entry is dead once its successor is visible
        while self.versions.len() > 1 {
            match self.versions.get(self.versions.len() - 2) {
                Some(next) if next.version() <= min_version => {
                    self.versions.pop_back();
                    removed += 1;
                }
                _ => break,
            }
        }
        removed
    }

    /// True if the chain is a lone tombstone visible at `min_version`
    pub fn is_dead(&self, min_version: u64) -> bool {
        self.versions.len() == 1
            && self
                .latest()
                .map_or(false, |sv| sv.is_tombstone() && sv.version() <= min_version)
    }

    /// Number of versions stored
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }
}

#[derive(Debug, Default)]
struct Inner {
    chains: BTreeMap<Key, VersionChain>,
    /// Keys holding history or a tombstone
    reclaimable: BTreeSet<Key>,
}

/// In-memory ordered MVCC store
#[derive(Debug, Default)]
pub struct OrderedStore {
    data: RwLock<Inner>,
    /// Highest version fully applied
    version: AtomicU64,
}

impl OrderedStore {
    /// Create an empty store at version 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with at least one entry, tombstoned keys included
    pub fn key_count(&self) -> usize {
        self.data.read().chains.len()
    }

    fn visible(chain: &VersionChain, max_version: u64) -> Option<VersionedValue> {
        chain
            .get_at_version(max_version)
            .and_then(StoredValue::to_versioned)
    }
}

impl Storage for OrderedStore {
    fn get_versioned(&self, key: &Key, max_version: u64) -> Result<Option<VersionedValue>> {
        let data = self.data.read();
        Ok(data
            .chains
            .get(key)
            .and_then(|chain| Self::visible(chain, max_version)))
    }

    fn key_version(&self, key: &Key, max_version: u64) -> Result<u64> {
        let data = self.data.read();
        Ok(data
            .chains
            .get(key)
            .and_then(|chain| chain.get_at_version(max_version))
            .map_or(0, StoredValue::version))
    }

    fn scan_range(
        &self,
        start: &Key,
        end: &Key,
        max_version: u64,
    ) -> Result<Vec<(Key, VersionedValue)>> {
        if start >= end {
            return Ok(Vec::new());
        }
        let data = self.data.read();
        Ok(data
            .chains
            .range::<Key, _>((Bound::Included(start), Bound::Excluded(end)))
            .filter_map(|(k, chain)| Self::visible(chain, max_version).map(|vv| (k.clone(), vv)))
            .collect())
    }

    fn scan_prefix(&self, prefix: &Key, max_version: u64) -> Result<Vec<(Key, VersionedValue)>> {
        let data = self.data.read();
        Ok(data
            .chains
            .range::<Key, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter_map(|(k, chain)| Self::visible(chain, max_version).map(|vv| (k.clone(), vv)))
            .collect())
    }

    fn current_version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn apply(&self, writes: Vec<(Key, Value)>, deletes: Vec<Key>, version: u64) -> Result<()> {
        let mut data = self.data.write();
        let current = self.version.load(Ordering::Acquire);
        if version <= current {
            return Err(Error::unavailable(format!(
                "commit version {} is not newer than store version {}",
                version, current
            )));
        }

        let Inner {
            chains,
            reclaimable,
        } = &mut *data;
        for (key, value) in writes {
            let entry = StoredValue::live(value, version);
            match chains.get_mut(&key) {
                Some(chain) => {
                    chain.push(entry);
                    reclaimable.insert(key);
                }
                None => {
                    chains.insert(key, VersionChain::new(entry));
                }
            }
        }
        for key in deletes {
            // Deleting a key that never existed leaves nothing to hide
            if let Some(chain) = chains.get_mut(&key) {
                chain.push(StoredValue::tombstone(version));
                reclaimable.insert(key);
            }
        }

        self.version.store(version, Ordering::Release);
        Ok(())
    }

    fn gc(&self, min_version: u64) -> usize {
        let mut data = self.data.write();
        let Inner {
            chains,
            reclaimable,
        } = &mut *data;
        let mut reclaimed = 0;
        reclaimable.retain(|key| {
            let chain = match chains.get_mut(key) {
                Some(chain) => chain,
                None => return false,
            };
            reclaimed += chain.gc(min_version);
            let dead = chain.is_dead(min_version);
            let pending = chain.version_count() > 1
                || chain.latest().map_or(false, StoredValue::is_tombstone);
            if dead {
                chains.remove(key);
                reclaimed += 1;
                return false;
            }
            pending
        });
        reclaimed
    }

    fn create_snapshot(self: Arc<Self>) -> Box<dyn SnapshotView> {
        Box::new(StorageSnapshot::new(self))
    }
}
