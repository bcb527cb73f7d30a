//! Error types for runstore
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! The variants are deliberately distinguishable so that an outer layer can map
//! them onto transport-level outcomes (not found, conflict, unavailable).

use crate::run_types::RunStatus;
use thiserror::Error;

/// Result type alias for runstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for runstore
#[derive(Debug, Error)]
pub enum Error {
    /// A lifecycle transition that the state machine does not allow
    #[error("Invalid transition for run {run_id}: {from} -> {to}")]
    InvalidTransition {
        /// Run the transition was attempted on
        run_id: String,
        /// Status currently recorded
        from: RunStatus,
        /// Status that was requested
        to: RunStatus,
    },

    /// Stop was requested with a terminal status other than the recorded one
    #[error("Run {run_id} already stopped as {recorded}, refusing {requested}")]
    ConflictingTerminalStatus {
        /// Run that was stopped twice
        run_id: String,
        /// Terminal status already recorded (this one wins)
        recorded: RunStatus,
        /// Terminal status of the rejected call
        requested: RunStatus,
    },

    /// Optimistic concurrency validation failed at commit
    ///
    /// Transient: the whole read-decide-write sequence should be retried.
    #[error("Write conflict: {reason}")]
    WriteConflict {
        /// Description of the conflict
        reason: String,
    },

    /// The storage substrate failed
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the failure
        message: String,
    },

    /// A mutating operation referenced a run that does not exist
    #[error("Record not found: {what}")]
    RecordNotFound {
        /// Description of what was looked up
        what: String,
    },

    /// A stored record could not be decoded
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A value could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Caller supplied an argument outside the accepted domain
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation attempted on a transaction that is no longer active
    #[error("Transaction not active: {0}")]
    TransactionNotActive(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a `StoreUnavailable` error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Error::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create a `RecordNotFound` error
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::RecordNotFound { what: what.into() }
    }

    /// True for transient conflicts signalled by the concurrency layer
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::WriteConflict { .. })
    }

    /// True if re-running the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }

    /// True if the error signals an unknown run or program
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::RecordNotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
