//! # PwaKit Offline Queue
//!
//! Defers application actions while the network is unavailable and replays
//! them once it returns.
//!
//! ## Features
//!
//! - **OfflineQueue**: durable FIFO of pending actions
//! - **ActionHandler**: application code that performs an action
//! - **NetworkStatus**: shared online/offline flag
//! - **ConnectivityHandler**: banners and replay on connectivity changes
//!
//! ## Architecture
//!
//! ```text
//! dispatch(action)
//!     │
//!     ├── online ──► ActionHandler::handle
//!     │
//!     └── offline ─► OfflineQueue ──► KeyValueStore ("offline-tasks")
//!                         │
//!     ConnectivityEvent ──┤
//!         Online ─────────┴──► replay() ──► ActionHandler (FIFO)
//!         Offline ───────────► StatusBanner
//! ```

use async_trait::async_trait;
use pwakit_common::PwaError;
use pwakit_store::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use thiserror::Error;

pub mod connectivity;
pub mod queue;

pub use connectivity::{
    ConnectivityEvent, ConnectivityHandler, NetworkStatus, StatusBanner, StatusEntry, StatusKind,
};
pub use queue::{Dispatched, OfflineQueue, ReplayReport};

// ==================== Errors ====================

/// Queue errors.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Action {name} failed: {message}")]
    ActionFailed { name: String, message: String },

    #[error("Replay already in progress")]
    ReplayInProgress,
}

impl QueueError {
    /// Build an action failure for `name`.
    pub fn action(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ActionFailed {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<QueueError> for PwaError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::ActionFailed { .. } | QueueError::ReplayInProgress => {
                PwaError::queue(err.to_string())
            }
            other => PwaError::queue_with_source("offline queue operation failed", other),
        }
    }
}

// ==================== Actions ====================

/// An application action that can be deferred.
///
/// Implemented by a closed enum tagged as `{"name": ..., "arguments": ...}`:
///
/// ```ignore
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// #[serde(tag = "name", content = "arguments")]
/// enum Action {
///     #[serde(rename = "something")]
///     Something(String),
/// }
/// ```
pub trait OfflineAction: Serialize + DeserializeOwned + Debug + Clone + Send + Sync + 'static {
    /// The action name shown to the user while it waits.
    fn name(&self) -> &'static str;
}

/// Performs actions, either directly or during replay.
#[async_trait]
pub trait ActionHandler<A: OfflineAction>: Send + Sync {
    async fn handle(&self, action: &A) -> Result<(), QueueError>;
}
