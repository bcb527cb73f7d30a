//! Concurrency layer for runstore
//!
//! This crate implements optimistic concurrency control (OCC) with:
//! - TransactionContext: read/write/delete set tracking
//! - Snapshot isolation over any `Storage`
//! - Conflict detection at commit time (first-committer-wins on the read-set)
//! - TransactionManager: serialized validate-and-apply

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod transaction;
pub mod validation;

pub use manager::TransactionManager;
pub use transaction::{CommitError, TransactionContext, TransactionStatus};
pub use validation::{validate_read_set, validate_transaction, ConflictType, ValidationResult};
