//! Push message display.

use pwakit_common::PushConfig;
use serde::{Deserialize, Serialize};

use crate::ServiceWorkerError;

/// Payload of a push message: `{"title": ..., "body": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl PushPayload {
    /// Parse the push message text.
    pub fn parse(data: &str) -> Result<Self, ServiceWorkerError> {
        serde_json::from_str(data).map_err(|e| ServiceWorkerError::PushError(e.to_string()))
    }
}

/// A notification ready to be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
}

impl Notification {
    /// Build the notification for `payload` with the configured artwork.
    pub fn from_payload(payload: PushPayload, config: &PushConfig) -> Self {
        Self {
            title: payload.title,
            body: payload.body,
            icon: config.icon.clone(),
            badge: config.badge.clone(),
        }
    }
}

/// Shows notifications to the user.
pub trait Notifier: Send + Sync {
    fn show(&self, notification: Notification) -> Result<(), ServiceWorkerError>;
}
