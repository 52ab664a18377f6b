//! # PwaKit Store
//!
//! Durable key-value storage for the offline task queue.
//!
//! ## Features
//!
//! - **KeyValueStore**: async `get`, `set`, `remove`, `clear` keyed by string
//! - **MemoryStore**: process-local store for tests and ephemeral sessions
//! - **FileStore**: JSON file on disk that survives restarts
//!
//! ## Architecture
//!
//! ```text
//! KeyValueStore (trait)
//!     │
//!     ├── MemoryStore
//!     │       └── key → JSON value
//!     │
//!     └── FileStore
//!             ├── key → JSON value (in memory)
//!             └── <dir>/<name>.json (write-through)
//! ```

use async_trait::async_trait;
use pwakit_common::PwaError;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// ==================== Errors ====================

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data error: {0}")]
    DataError(#[from] serde_json::Error),

    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for PwaError {
    fn from(err: StoreError) -> Self {
        PwaError::store_with_source("key-value store operation failed", err)
    }
}

// ==================== KeyValueStore ====================

/// An asynchronous, process-independent key-value store.
///
/// Values are JSON documents. Writes replace the whole value stored under a
/// key; there is no compare-and-swap.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: JsonValue) -> Result<(), StoreError>;

    /// Remove `key`. Returns whether a value was present.
    async fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove every key.
    async fn clear(&self) -> Result<(), StoreError>;

    /// List stored keys in no particular order.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Reject keys the file format cannot round-trip.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("offline-tasks").is_ok());
        assert!(matches!(validate_key(""), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn test_store_error_into_pwa_error() {
        let err: PwaError = StoreError::Unavailable("disk full".into()).into();
        assert_eq!(err.category(), "store");
    }
}
