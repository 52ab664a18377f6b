//! Background sync seam between the worker and the offline task queue.

use async_trait::async_trait;

use crate::Result;

/// Receiver of `sync` events forwarded by the worker.
///
/// The worker only forwards events whose tag matches the configured sync tag.
#[async_trait]
pub trait BackgroundSync: Send + Sync {
    /// Run the deferred work registered under `tag`.
    async fn sync(&self, tag: &str) -> Result<()>;
}
