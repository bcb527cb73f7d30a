//! Store configuration via `runstore.toml`
//!
//! `Database::open(dir)` reads `runstore.toml` from `dir`. On first open a
//! commented default file is written there. To change settings, edit the file
//! and reopen.

use super::transactions::RetryConfig;
use runstore_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the store directory.
pub const CONFIG_FILE_NAME: &str = "runstore.toml";

/// Default number of run records removed per scope-delete transaction.
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 100;

/// Store configuration loaded from `runstore.toml`.
///
/// # Example
///
/// ```toml
/// delete_batch_size = 100
///
/// [retry]
/// max_retries = 3
/// base_delay_ms = 10
/// max_delay_ms = 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Run records removed per transaction by scope deletes
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,
    /// Conflict retry policy applied to every store operation
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_delete_batch_size() -> usize {
    DEFAULT_DELETE_BATCH_SIZE
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            delete_batch_size: default_delete_batch_size(),
            retry: RetryConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Check values that parse but make no sense.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `delete_batch_size` is zero or the retry
    /// base delay exceeds the maximum delay.
    pub fn validate(&self) -> Result<()> {
        if self.delete_batch_size == 0 {
            return Err(Error::Config(
                "delete_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# runstore configuration

# Run records removed per transaction when deleting a namespace or
# application. Larger batches finish sooner but hold bigger transactions.
delete_batch_size = 100

# Retry policy for write conflicts. Every operation is retried from scratch
# with exponential backoff until it commits or max_retries is exhausted.
[retry]
max_retries = 3
base_delay_ms = 10
max_delay_ms = 100
"#
    }

    /// Parse config from TOML text and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
