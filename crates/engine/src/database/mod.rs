//! Database struct and transaction API
//!
//! This module provides the Database struct that owns:
//! - The storage substrate
//! - The transaction coordinator
//! - The store configuration
//!
//! ## Transaction API
//!
//! 1. **Closure API** (recommended): `db.transaction(|txn| { ... })`
//!    - Automatic commit on success, abort on error
//!    - A panic unwinds past the buffered transaction, which is dropped unapplied
//!
//! 2. **Retrying closure API**: `db.transaction_with_retry(&retry, |txn| { ... })`
//!    - Re-runs the closure on `WriteConflict` with exponential backoff
//!
//! 3. **Manual API**: `begin_transaction()` + `commit_transaction()`
//!    - For cases requiring external control over commit timing

pub mod config;
mod transactions;

pub use config::{StoreConfig, CONFIG_FILE_NAME, DEFAULT_DELETE_BATCH_SIZE};
pub use transactions::RetryConfig;

use crate::coordinator::{TransactionCoordinator, TransactionMetrics};
use runstore_concurrency::TransactionContext;
use runstore_core::{Error, Result, Storage};
use runstore_storage::OrderedStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Transactional handle over a storage substrate
pub struct Database {
    storage: Arc<dyn Storage>,
    coordinator: TransactionCoordinator,
    config: StoreConfig,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("version", &self.storage.current_version())
            .field("config", &self.config)
            .finish()
    }
}

impl Database {
    /// In-memory database with default configuration
    pub fn ephemeral() -> Self {
        Self {
            storage: Arc::new(OrderedStore::new()),
            coordinator: TransactionCoordinator::new(),
            config: StoreConfig::default(),
        }
    }

    /// In-memory database with explicit configuration
    ///
    /// # Errors
    /// Returns `Error::Config` if the configuration does not validate.
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        Self::with_storage(Arc::new(OrderedStore::new()), config)
    }

    /// Database over a caller-supplied substrate
    pub fn with_storage(storage: Arc<dyn Storage>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            coordinator: TransactionCoordinator::new(),
            config,
        })
    }

    /// In-memory database configured from `dir/runstore.toml`
    ///
    /// The default file is written first if it is missing. The directory
    /// holds configuration only; data is not persisted.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::Config(format!(
                "Failed to create store directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
        let path = dir.join(CONFIG_FILE_NAME);
        StoreConfig::write_default_if_missing(&path)?;
        let config = StoreConfig::from_file(&path)?;
        info!(
            target: "runstore::db",
            path = %path.display(),
            delete_batch_size = config.delete_batch_size,
            max_retries = config.retry.max_retries,
            "Opened store"
        );
        Self::with_config(config)
    }

    /// Active configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Underlying substrate
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Transaction counters since creation
    pub fn metrics(&self) -> TransactionMetrics {
        self.coordinator.metrics()
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Execute one transaction attempt: commit on success, abort on error.
    fn run_single_attempt<T>(&self, txn: &mut TransactionContext, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit_transaction(txn)?;
                Ok(value)
            }
            Err(e) => {
                let _ = txn.mark_aborted(format!("Closure error: {}", e));
                self.coordinator.record_abort();
                Err(e)
            }
        }
    }

    /// Execute a transaction with the given closure
    ///
    /// # Returns
    /// * `Ok(T)` - Closure return value on successful commit
    /// * `Err` - On validation conflict or closure error
    ///
    /// # Example
    /// ```text
    /// let result = db.transaction(|txn| {
    ///     let val = txn.get(&key)?;
    ///     txn.put(key, new_value)?;
    ///     Ok(val)
    /// })?;
    /// ```
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TransactionContext) -> Result<T>,
    {
        let mut txn = self.begin_transaction();
        let result = f(&mut txn);
        self.run_single_attempt(&mut txn, result)
    }

    /// Execute a transaction with automatic retry on conflict
    ///
    /// The closure is called repeatedly until either:
    /// - The transaction commits successfully
    /// - A non-conflict error occurs (not retried)
    /// - Maximum retries are exceeded (the last `WriteConflict` is returned)
    pub fn transaction_with_retry<F, T>(&self, config: &RetryConfig, f: F) -> Result<T>
    where
        F: Fn(&mut TransactionContext) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            let mut txn = self.begin_transaction();
            let result = f(&mut txn);
            match self.run_single_attempt(&mut txn, result) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_conflict() && attempt < config.max_retries => {
                    let delay = config.calculate_delay(attempt);
                    warn!(
                        target: "runstore::txn",
                        attempt = attempt + 1,
                        max_retries = config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Write conflict, retrying transaction"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Begin a new transaction (for manual control)
    ///
    /// Prefer `transaction()` closure API for automatic handling.
    pub fn begin_transaction(&self) -> TransactionContext {
        self.coordinator.start_transaction(&self.storage)
    }

    /// Commit a transaction
    ///
    /// # Returns
    /// * `Ok(commit_version)` - Version assigned to every write of `txn`
    ///
    /// # Errors
    /// - `WriteConflict` - Read-set validation failed, transaction aborted
    /// - `StoreUnavailable` - The substrate failed
    /// - `TransactionNotActive` - Transaction not in Active state
    pub fn commit_transaction(&self, txn: &mut TransactionContext) -> Result<u64> {
        self.coordinator.commit(txn, self.storage.as_ref())
    }
}
