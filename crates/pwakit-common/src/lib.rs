//! # PwaKit Common
//!
//! Common utilities, error types, configuration, and logging setup shared by
//! the PwaKit offline crates.
//!
//! ## Features
//!
//! - Unified error type with backtrace support
//! - Logging configuration and setup
//! - Worker and queue configuration (`PwaConfig`)
//! - Background sync seam between the worker and the task queue

use thiserror::Error;

pub mod config;
pub mod logging;
pub mod sync;

pub use config::{CacheConfig, PushConfig, PwaConfig, QueueConfig};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use sync::BackgroundSync;

/// Unified error type for PwaKit.
#[derive(Error, Debug)]
pub enum PwaError {
    /// Network-related errors.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Cache storage errors.
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Persistent store errors.
    #[error("Store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Offline queue errors.
    #[error("Queue error: {message}")]
    Queue {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL errors.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        backtrace: Option<backtrace::Backtrace>,
    },
}

impl PwaError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
            source: None,
        }
    }

    /// Create a store error with source.
    pub fn store_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a queue error.
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
            source: None,
        }
    }

    /// Create a queue error with source.
    pub fn queue_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Queue {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with backtrace.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            PwaError::Network { .. } => "network",
            PwaError::Cache { .. } => "cache",
            PwaError::Store { .. } => "store",
            PwaError::Queue { .. } => "queue",
            PwaError::Config { .. } => "config",
            PwaError::Io(_) => "io",
            PwaError::Json(_) => "json",
            PwaError::Url(_) => "url",
            PwaError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for PwaKit operations.
pub type Result<T> = std::result::Result<T, PwaError>;

/// Milliseconds since the Unix epoch, saturating at zero on clock skew.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(PwaError::network("test").category(), "network");
        assert_eq!(PwaError::queue("test").category(), "queue");
        assert_eq!(PwaError::config("test").category(), "config");
    }
}
