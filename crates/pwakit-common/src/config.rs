//! Worker and offline queue configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::{PwaError, Result};

/// Top-level configuration for an installable application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PwaConfig {
    /// Application id used in page addresses (`f?p=<app_id>:<page>`)
    pub app_id: u32,

    /// Entry point of the application, used when no controlled client is known
    pub base_url: String,

    /// Pages pre-cached into the static cache at install time
    pub pages: Vec<u32>,

    /// Page served for HTML requests that neither network nor cache can answer
    pub not_found_page: u32,

    /// Cache settings
    pub cache: CacheConfig,

    /// Offline task queue settings
    pub queue: QueueConfig,

    /// Push notification display settings
    pub push: PushConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of the install-time page cache
    pub static_name: String,

    /// Name of the not-found page cache
    pub not_found_name: String,

    /// Name of the cache filled from live responses
    pub dynamic_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Store key holding the pending task list
    pub store_key: String,

    /// Background sync tag that triggers a replay from the worker
    pub sync_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Icon shown with push notifications
    pub icon: String,

    /// Badge shown with push notifications
    pub badge: String,
}

impl Default for PwaConfig {
    fn default() -> Self {
        Self {
            app_id: 1694,
            base_url: "http://localhost:31810/ords/f".to_string(),
            pages: vec![1],
            not_found_page: 404,
            cache: CacheConfig::default(),
            queue: QueueConfig::default(),
            push: PushConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            static_name: "static-cache".to_string(),
            not_found_name: "404-cache".to_string(),
            dynamic_name: "dynamic-cache".to_string(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            store_key: "offline-tasks".to_string(),
            sync_tag: "pwa-offline-tasks".to_string(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            icon: "./images/icons/icon-192x192.png".to_string(),
            badge: "./images/icons/icon-192x192.png".to_string(),
        }
    }
}

impl PwaConfig {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), app_id = config.app_id, "Loaded configuration");
        Ok(config)
    }

    /// Check the configuration for values the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url)?;

        let names = [
            &self.cache.static_name,
            &self.cache.not_found_name,
            &self.cache.dynamic_name,
        ];
        if names.iter().any(|n| n.is_empty()) {
            return Err(PwaError::config("cache names must not be empty"));
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(PwaError::config("cache names must be distinct"));
        }
        if self.queue.store_key.is_empty() {
            return Err(PwaError::config("queue store key must not be empty"));
        }
        Ok(())
    }
}
