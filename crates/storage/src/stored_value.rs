//! Storage-layer entry wrapper
//!
//! The contract type `VersionedValue` has no notion of deletion. The storage
//! layer needs one so that a delete is itself a versioned event: a snapshot
//! taken before the delete still sees the value, and read-set validation
//! sees the key's version move. `StoredValue` is that entry.

use runstore_core::{Value, VersionedValue};

/// A versioned entry that may be a tombstone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    /// Payload, or None for a tombstone
    value: Option<Value>,
    /// Commit version that wrote this entry
    version: u64,
}

impl StoredValue {
    /// Live value written at `version`
    pub fn live(value: Value, version: u64) -> Self {
        StoredValue {
            value: Some(value),
            version,
        }
    }

    /// Deletion marker written at `version`
    pub fn tombstone(version: u64) -> Self {
        StoredValue {
            value: None,
            version,
        }
    }

    /// Get the version
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// True for deletion markers
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Contract view of a live entry, None for tombstones
    pub fn to_versioned(&self) -> Option<VersionedValue> {
        self.value
            .as_ref()
            .map(|v| VersionedValue::new(v.clone(), self.version))
    }
}
