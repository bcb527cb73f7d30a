//! Storage layer for runstore
//!
//! This crate implements the in-memory ordered substrate with:
//! - OrderedStore: BTreeMap of per-key version chains behind a RwLock
//! - StoredValue: versioned entries with tombstones
//! - StorageSnapshot: version-bounded views over any `Storage`
//! - FaultInjectingStorage: failure injection for tests of upper layers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ordered;
pub mod snapshot;
pub mod stored_value;
pub mod testing;

pub use ordered::{OrderedStore, VersionChain};
pub use snapshot::StorageSnapshot;
pub use stored_value::StoredValue;
pub use testing::FaultInjectingStorage;
