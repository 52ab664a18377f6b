//! Connectivity flag, status banners and replay on reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::queue::OfflineQueue;
use crate::{OfflineAction, QueueError};

/// Shared online/offline flag. Clones observe the same value.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    online: Arc<AtomicBool>,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Update the flag. Returns the previous value.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst)
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

/// A connectivity change reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Error,
    Info,
}

/// One line of the offline banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub kind: StatusKind,
    pub message: String,
}

impl StatusEntry {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Info,
            message: message.into(),
        }
    }
}

/// Page-level status messages.
pub trait StatusBanner: Send + Sync {
    fn show_success(&self, message: &str);
    fn clear_success(&self);
    /// Replace the error area with `entries`.
    fn show_errors(&self, entries: &[StatusEntry]);
}

/// Reacts to connectivity changes: banners on both edges, replay on reconnect.
pub struct ConnectivityHandler<A: OfflineAction> {
    queue: Arc<OfflineQueue<A>>,
    banner: Arc<dyn StatusBanner>,
}

impl<A: OfflineAction> ConnectivityHandler<A> {
    pub fn new(queue: Arc<OfflineQueue<A>>, banner: Arc<dyn StatusBanner>) -> Self {
        Self { queue, banner }
    }

    /// Handle one event.
    ///
    /// The flag is read when the event is handled, so an event that no longer
    /// matches the current state does nothing.
    pub async fn handle(&self, event: ConnectivityEvent) -> Result<(), QueueError> {
        let online = self.queue.status().is_online();
        match event {
            ConnectivityEvent::Online if online => self.back_online().await,
            ConnectivityEvent::Offline if !online => {
                self.went_offline().await;
                Ok(())
            }
            _ => {
                debug!(?event, online, "Ignoring stale connectivity event");
                Ok(())
            }
        }
    }

    /// Handle events until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<ConnectivityEvent>) {
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.handle(event).await {
                error!(?event, error = %e, "Connectivity handling failed");
            }
        }
        debug!("Connectivity channel closed");
    }

    async fn back_online(&self) -> Result<(), QueueError> {
        let pending = self.queue.len().await;
        let mut message = String::from("You are back online!");
        if pending > 0 {
            message.push_str(&format!(" Now running {pending} tasks."));
        }
        self.banner.show_success(&message);

        match self.queue.replay().await {
            Ok(report) => {
                info!(succeeded = report.succeeded, failed = report.failed, "Back online");
                Ok(())
            }
            Err(QueueError::ReplayInProgress) => {
                debug!("Replay already running");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn went_offline(&self) {
        self.banner.clear_success();
        let mut entries = vec![StatusEntry::error("You have lost connection")];
        entries.extend(self.queue.pending().await.iter().map(|action| {
            StatusEntry::info(format!("Waiting to reconnect to execute: {}", action.name()))
        }));
        info!(pending = entries.len() - 1, "Connection lost");
        self.banner.show_errors(&entries);
    }
}
