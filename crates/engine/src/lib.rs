//! Database engine for runstore
//!
//! This crate ties the lower layers together:
//! - Database: storage + coordinator + configuration
//! - Scoped transactions with commit-or-abort on every exit path
//! - Conflict retry with exponential backoff
//! - `runstore.toml` configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod database;

pub use coordinator::{TransactionCoordinator, TransactionMetrics};
pub use database::{Database, RetryConfig, StoreConfig, CONFIG_FILE_NAME, DEFAULT_DELETE_BATCH_SIZE};
