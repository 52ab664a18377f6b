//! # PwaKit Service Worker
//!
//! Offline caching worker for installable low-code applications.
//!
//! ## Features
//!
//! - **Lifecycle**: install, activate, fetch, sync, push, notification events
//! - **Cache set**: static, not-found and dynamic caches
//! - **Fetch interception**: network first, cache and not-found fallbacks
//! - **Clients**: pages controlled by the worker
//! - **Background sync**: hands matching `sync` events to the task queue
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker
//!     ├── state (Parsed → Installing → Installed → Activating → Activated)
//!     ├── Clients
//!     ├── FetchStrategy ──► Network
//!     │       └── CacheStorage
//!     │               ├── Static
//!     │               ├── NotFound
//!     │               └── Dynamic
//!     ├── BackgroundSync (optional)
//!     └── Notifier (optional)
//! ```

use hashbrown::HashMap;
use pwakit_common::{BackgroundSync, PwaConfig, PwaError};
use pwakit_net::{FetchRequest, Network};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

pub mod bootstrap;
pub mod cache;
pub mod push;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use bootstrap::{InstallReport, PageUrls};
pub use cache::{Cache, CacheEntry, CacheName, CacheStorage};
pub use push::{Notification, Notifier, PushPayload};
pub use strategy::{FetchOutcome, FetchStrategy};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone)]
pub enum ServiceWorkerError {
    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Push error: {0}")]
    PushError(String),

    #[error("Sync error: {0}")]
    SyncError(String),
}

impl From<ServiceWorkerError> for PwaError {
    fn from(err: ServiceWorkerError) -> Self {
        match err {
            ServiceWorkerError::NetworkError(message) => PwaError::network(message),
            ServiceWorkerError::CacheError(message) => PwaError::cache(message),
            ServiceWorkerError::RegistrationFailed(message) => PwaError::config(message),
            other => PwaError::internal(other.to_string()),
        }
    }
}

// ==================== Types ====================

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Initial state, worker created.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced).
    Redundant,
}

impl ServiceWorkerState {
    /// Whether fetches go through the caching strategy.
    pub fn intercepts_fetch(&self) -> bool {
        matches!(
            self,
            ServiceWorkerState::Installed
                | ServiceWorkerState::Activating
                | ServiceWorkerState::Activated
        )
    }
}

// ==================== Clients ====================

/// A client (controlled page).
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Whether this worker controls the client.
    pub controlled: bool,
}

/// Pages known to the worker.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Match all clients.
    pub fn match_all(&self, include_uncontrolled: bool) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|c| include_uncontrolled || c.controlled)
            .collect()
    }

    /// Take control of every client. Returns how many were newly claimed.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut().filter(|c| !c.controlled) {
            client.controlled = true;
            claimed += 1;
        }
        claimed
    }

    /// Add an uncontrolled client for `url`. Returns its id.
    pub fn add(&mut self, url: Url) -> String {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed));
        self.clients.insert(
            id.clone(),
            Client {
                id: id.clone(),
                url,
                controlled: false,
            },
        );
        id
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }
}

// ==================== Events ====================

/// Lifecycle and functional events delivered by the hosting runtime.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(FetchRequest),
    Sync { tag: String },
    Push { data: String },
    NotificationClick { tag: String },
    NotificationClose { tag: String },
}

/// The worker's answer to an event.
#[derive(Debug, Clone)]
pub enum WorkerReply {
    Installed(InstallReport),
    Activated { claimed: usize },
    Fetch(FetchOutcome),
    Done,
}

/// Notifications emitted by the worker.
#[derive(Debug, Clone)]
pub enum ServiceWorkerEvent {
    /// State changed.
    StateChange {
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
    },
    /// An install-time cache could not be populated.
    InstallIncomplete {
        cache: CacheName,
        /// Configured storage name of the cache.
        name: String,
        error: String,
    },
}

// ==================== Service Worker ====================

/// The worker context: owns the cache set, its clients and collaborators.
pub struct ServiceWorker {
    /// Unique ID.
    pub id: ServiceWorkerId,

    config: PwaConfig,
    state: RwLock<ServiceWorkerState>,
    caches: Arc<RwLock<CacheStorage>>,
    network: Arc<dyn Network>,
    strategy: FetchStrategy,
    clients: RwLock<Clients>,
    background_sync: Option<Arc<dyn BackgroundSync>>,
    notifier: Option<Arc<dyn Notifier>>,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorker {
    /// Create a worker for `config` that fetches through `network`.
    ///
    /// Fails if `config` does not validate.
    pub fn new(
        config: PwaConfig,
        network: Arc<dyn Network>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>), ServiceWorkerError> {
        config
            .validate()
            .map_err(|e| ServiceWorkerError::RegistrationFailed(e.to_string()))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let caches = Arc::new(RwLock::new(CacheStorage::new()));
        let not_found_url = PageUrls::derive(&config, &[])?.not_found_url;
        let strategy = FetchStrategy::new(
            caches.clone(),
            network.clone(),
            not_found_url,
            config.cache.clone(),
        );

        Ok((
            Self {
                id: ServiceWorkerId::new(),
                config,
                state: RwLock::new(ServiceWorkerState::Parsed),
                caches,
                network,
                strategy,
                clients: RwLock::new(Clients::new()),
                background_sync: None,
                notifier: None,
                event_tx,
            },
            event_rx,
        ))
    }

    /// Forward matching `sync` events to `handler`.
    pub fn with_background_sync(mut self, handler: Arc<dyn BackgroundSync>) -> Self {
        self.background_sync = Some(handler);
        self
    }

    /// Show push messages through `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Current state.
    pub async fn state(&self) -> ServiceWorkerState {
        *self.state.read().await
    }

    /// Shared handle to the cache set.
    pub fn caches(&self) -> Arc<RwLock<CacheStorage>> {
        self.caches.clone()
    }

    /// Register a page the worker may control. Returns the client id.
    pub async fn add_client(&self, url: Url) -> String {
        self.clients.write().await.add(url)
    }

    /// Forget a page.
    pub async fn remove_client(&self, id: &str) -> Option<Client> {
        self.clients.write().await.remove(id)
    }

    async fn set_state(&self, new_state: ServiceWorkerState) {
        *self.state.write().await = new_state;
        self.announce(new_state);
    }

    /// Move from `from` to `to`, checking and writing under one lock.
    async fn transition(
        &self,
        from: ServiceWorkerState,
        to: ServiceWorkerState,
    ) -> Result<(), ServiceWorkerError> {
        {
            let mut state = self.state.write().await;
            if *state != from {
                return Err(ServiceWorkerError::StateError(format!(
                    "Cannot move to {to:?} from {:?}",
                    *state
                )));
            }
            *state = to;
        }
        self.announce(to);
        Ok(())
    }

    fn announce(&self, new_state: ServiceWorkerState) {
        debug!(worker = ?self.id, state = ?new_state, "State changed");
        let _ = self.event_tx.send(ServiceWorkerEvent::StateChange {
            worker_id: self.id,
            new_state,
        });
    }

    /// Dispatch one event.
    pub async fn handle_event(&self, event: WorkerEvent) -> Result<WorkerReply, ServiceWorkerError> {
        match event {
            WorkerEvent::Install => self.install().await.map(WorkerReply::Installed),
            WorkerEvent::Activate => self
                .activate()
                .await
                .map(|claimed| WorkerReply::Activated { claimed }),
            WorkerEvent::Fetch(request) => Ok(WorkerReply::Fetch(self.fetch(&request).await)),
            WorkerEvent::Sync { tag } => self.sync(&tag).await.map(|_| WorkerReply::Done),
            WorkerEvent::Push { data } => self.push(&data).map(|_| WorkerReply::Done),
            WorkerEvent::NotificationClick { tag } => {
                info!(tag = %tag, "Notification clicked");
                Ok(WorkerReply::Done)
            }
            WorkerEvent::NotificationClose { tag } => {
                info!(tag = %tag, "Notification closed");
                Ok(WorkerReply::Done)
            }
        }
    }

    /// Populate the static and not-found caches.
    ///
    /// Completes once both bulk stores have finished. A failed bulk store is
    /// logged and reported; the worker still becomes `Installed`.
    pub async fn install(&self) -> Result<InstallReport, ServiceWorkerError> {
        self.transition(ServiceWorkerState::Parsed, ServiceWorkerState::Installing)
            .await?;
        info!(worker = ?self.id, "Installing service worker");

        let client_urls: Vec<Url> = self
            .clients
            .read()
            .await
            .match_all(true)
            .into_iter()
            .map(|c| c.url.clone())
            .collect();
        let urls = PageUrls::derive(&self.config, &client_urls)?;
        self.strategy.set_not_found_url(urls.not_found_url.clone()).await;

        let report = bootstrap::install_caches(
            &self.caches,
            self.network.as_ref(),
            &urls,
            &self.config.cache,
        )
        .await;
        for (cache, result) in [
            (CacheName::Static, &report.static_cache),
            (CacheName::NotFound, &report.not_found_cache),
        ] {
            if let Err(e) = result {
                let _ = self.event_tx.send(ServiceWorkerEvent::InstallIncomplete {
                    cache,
                    name: cache.label(&self.config.cache).to_string(),
                    error: e.to_string(),
                });
            }
        }

        self.set_state(ServiceWorkerState::Installed).await;
        Ok(report)
    }

    /// Activate the installed worker and claim all clients.
    pub async fn activate(&self) -> Result<usize, ServiceWorkerError> {
        self.transition(ServiceWorkerState::Installed, ServiceWorkerState::Activating)
            .await?;
        let claimed = self.clients.write().await.claim();
        self.set_state(ServiceWorkerState::Activated).await;
        info!(worker = ?self.id, claimed, "Activated service worker");
        Ok(claimed)
    }

    /// Mark the worker as replaced. It stops intercepting fetches.
    pub async fn retire(&self) {
        self.set_state(ServiceWorkerState::Redundant).await;
        info!(worker = ?self.id, "Service worker is redundant");
    }

    /// Answer a fetch from a controlled page.
    ///
    /// Before install completes the request goes straight to the network.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        if self.state().await.intercepts_fetch() {
            return self.strategy.handle(request).await;
        }
        match self.network.fetch(request).await {
            Ok(response) => FetchOutcome::Network(response),
            Err(e) => FetchOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// Handle a background sync event.
    pub async fn sync(&self, tag: &str) -> Result<(), ServiceWorkerError> {
        if tag != self.config.queue.sync_tag {
            debug!(tag, "Ignoring sync for unknown tag");
            return Ok(());
        }
        let Some(handler) = &self.background_sync else {
            warn!(tag, "Sync requested but no handler registered");
            return Ok(());
        };
        info!(tag, "Syncing offline tasks");
        handler.sync(tag).await.map_err(|e| {
            error!(tag, category = e.category(), error = %e, "Background sync failed");
            ServiceWorkerError::SyncError(e.to_string())
        })
    }

    /// Display a push message. Malformed payloads are logged and dropped.
    pub fn push(&self, data: &str) -> Result<(), ServiceWorkerError> {
        let payload = match PushPayload::parse(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Dropping malformed push payload");
                return Ok(());
            }
        };
        info!(title = %payload.title, "Push received");
        match &self.notifier {
            Some(notifier) => notifier.show(Notification::from_payload(payload, &self.config.push)),
            None => {
                debug!("No notifier registered, push not displayed");
                Ok(())
            }
        }
    }
}
