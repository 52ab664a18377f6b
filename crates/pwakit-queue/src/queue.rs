//! The durable FIFO of deferred actions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pwakit_common::{BackgroundSync, PwaError, QueueConfig};
use pwakit_store::KeyValueStore;
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::connectivity::{ConnectivityEvent, NetworkStatus};
use crate::{ActionHandler, OfflineAction, QueueError};

/// What `dispatch` did with an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Performed immediately.
    Ran,
    /// Queued until the network returns.
    Queued,
}

/// Result of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// A queued action with its stored form, encoded once.
#[derive(Debug, Clone)]
struct Queued<A> {
    action: A,
    record: JsonValue,
}

/// Pending actions, kept in memory and mirrored to a [`KeyValueStore`].
pub struct OfflineQueue<A: OfflineAction> {
    tasks: Mutex<Vec<Queued<A>>>,
    store: Arc<dyn KeyValueStore>,
    handler: Arc<dyn ActionHandler<A>>,
    status: NetworkStatus,
    config: QueueConfig,
    replaying: AtomicBool,
    enqueue_tx: Option<mpsc::UnboundedSender<ConnectivityEvent>>,
}

/// Clears the replaying flag when the pass ends, however it ends.
struct ReplayGuard<'a>(&'a AtomicBool);

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<A: OfflineAction> OfflineQueue<A> {
    /// Open the queue, loading any actions persisted by an earlier session.
    ///
    /// Persisted records that no longer decode into `A` are logged and skipped.
    pub async fn open(
        store: Arc<dyn KeyValueStore>,
        handler: Arc<dyn ActionHandler<A>>,
        status: NetworkStatus,
        config: QueueConfig,
    ) -> Result<Self, QueueError> {
        let tasks = match store.get(&config.store_key).await? {
            Some(JsonValue::Array(records)) => decode_records(records),
            Some(other) => {
                warn!(key = %config.store_key, value = %other, "Ignoring malformed task list");
                Vec::new()
            }
            None => Vec::new(),
        };
        info!(key = %config.store_key, pending = tasks.len(), "Opened offline queue");

        Ok(Self {
            tasks: Mutex::new(tasks),
            store,
            handler,
            status,
            config,
            replaying: AtomicBool::new(false),
            enqueue_tx: None,
        })
    }

    /// Send `ConnectivityEvent::Offline` to `tx` after every enqueue so the
    /// offline banner lists the new task.
    pub fn notify_on_enqueue(mut self, tx: mpsc::UnboundedSender<ConnectivityEvent>) -> Self {
        self.enqueue_tx = Some(tx);
        self
    }

    /// The shared connectivity flag.
    pub fn status(&self) -> &NetworkStatus {
        &self.status
    }

    /// Perform `action` now when online, otherwise queue it.
    pub async fn dispatch(&self, action: A) -> Result<Dispatched, QueueError> {
        if self.status.is_online() {
            debug!(action = action.name(), "Online, running action");
            self.handler.handle(&action).await?;
            return Ok(Dispatched::Ran);
        }
        self.enqueue(action).await?;
        Ok(Dispatched::Queued)
    }

    /// Append `action` and persist the queue. Performs no network I/O.
    ///
    /// A failed persistence write is logged; the action stays queued in memory.
    pub async fn enqueue(&self, action: A) -> Result<(), QueueError> {
        let name = action.name();
        let record = serde_json::to_value(&action)?;

        {
            let mut tasks = self.tasks.lock().await;
            tasks.push(Queued { action, record });
            info!(action = name, pending = tasks.len(), "Queued action until reconnect");
            if let Err(e) = self.persist(&tasks).await {
                error!(action = name, error = %e, "Failed to persist offline queue");
            }
        }

        if let Some(tx) = &self.enqueue_tx {
            let _ = tx.send(ConnectivityEvent::Offline);
        }
        Ok(())
    }

    /// Run every queued action in insertion order, then drop them.
    ///
    /// A failing action is logged and removed like the others. Actions queued
    /// while the pass runs are kept for the next one.
    pub async fn replay(&self) -> Result<ReplayReport, QueueError> {
        if self.replaying.swap(true, Ordering::SeqCst) {
            return Err(QueueError::ReplayInProgress);
        }
        let _guard = ReplayGuard(&self.replaying);

        let snapshot = self.tasks.lock().await.clone();
        let mut report = ReplayReport {
            attempted: snapshot.len(),
            ..Default::default()
        };

        for Queued { action, .. } in &snapshot {
            match self.handler.handle(action).await {
                Ok(()) => {
                    debug!(action = action.name(), "Replayed action");
                    report.succeeded += 1;
                }
                Err(e) => {
                    warn!(action = action.name(), error = %e, "Replayed action failed, dropping it");
                    report.failed += 1;
                }
            }
        }

        let mut tasks = self.tasks.lock().await;
        tasks.drain(..snapshot.len());
        self.persist(&tasks).await?;

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            remaining = tasks.len(),
            "Replay finished"
        );
        Ok(report)
    }

    /// Number of queued actions.
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Whether nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Snapshot of the queued actions in order.
    pub async fn pending(&self) -> Vec<A> {
        self.tasks
            .lock()
            .await
            .iter()
            .map(|queued| queued.action.clone())
            .collect()
    }

    async fn persist(&self, tasks: &[Queued<A>]) -> Result<(), QueueError> {
        if tasks.is_empty() {
            self.store.remove(&self.config.store_key).await?;
        } else {
            let records = tasks.iter().map(|queued| queued.record.clone()).collect();
            self.store
                .set(&self.config.store_key, JsonValue::Array(records))
                .await?;
        }
        Ok(())
    }
}

fn decode_records<A: OfflineAction>(records: Vec<JsonValue>) -> Vec<Queued<A>> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record.clone()) {
            Ok(action) => Some(Queued { action, record }),
            Err(e) => {
                warn!(index, error = %e, "Skipping undecodable queued task");
                None
            }
        })
        .collect()
}

#[async_trait]
impl<A: OfflineAction> BackgroundSync for OfflineQueue<A> {
    async fn sync(&self, tag: &str) -> pwakit_common::Result<()> {
        if tag != self.config.sync_tag {
            return Ok(());
        }
        match self.replay().await {
            Ok(_) => Ok(()),
            Err(QueueError::ReplayInProgress) => {
                debug!(tag, "Replay already running");
                Ok(())
            }
            Err(e) => Err(PwaError::from(e)),
        }
    }
}
