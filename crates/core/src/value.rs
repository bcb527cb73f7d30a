//! Stored value types
//!
//! - `Value`: payload stored under a key
//! - `VersionedValue`: a value plus the commit version that wrote it
//!
//! Structured records are stored as JSON text via [`Value::json`] and read back
//! with [`Value::decode`]. A payload that fails to decode is reported as
//! `Error::Corruption`, never as a serialization error, so callers can tell a
//! damaged record apart from a value they failed to write.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Payload stored under a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Empty marker
    Null,
    /// UTF-8 text, usually JSON
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl Value {
    /// Encode a serializable record as JSON text
    pub fn json<T: Serialize>(record: &T) -> Result<Value> {
        Ok(Value::String(serde_json::to_string(record)?))
    }

    /// Decode a JSON record
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let parsed = match self {
            Value::String(s) => serde_json::from_str(s),
            Value::Bytes(b) => serde_json::from_slice(b),
            Value::Null => {
                return Err(Error::Corruption(
                    "expected a JSON record, found null".to_string(),
                ))
            }
        };
        parsed.map_err(|e| Error::Corruption(e.to_string()))
    }

    /// Text content, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A value together with the commit version that wrote it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    /// Stored payload
    pub value: Value,
    /// Commit version of the write
    pub version: u64,
}

impl VersionedValue {
    /// Pair a value with its version
    pub fn new(value: Value, version: u64) -> Self {
        VersionedValue { value, version }
    }
}
