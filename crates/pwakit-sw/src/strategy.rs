//! Network-first fetch strategy with cache and not-found fallbacks.
//!
//! ```text
//! request ──► network ──ok──► respond (and fill dynamic cache once)
//!                │
//!              error
//!                ▼
//!          static / dynamic ──hit──► respond from cache
//!                │
//!              miss
//!                ▼
//!       accepts text/html? ──yes──► not-found page
//!                │
//!                no ──► failed fetch
//! ```

use std::sync::Arc;

use http::{Method, StatusCode};
use pwakit_common::CacheConfig;
use pwakit_net::{cache_key, FetchRequest, FetchResponse, Network};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheEntry, CacheName, CacheStorage};

/// How an intercepted request was answered.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Fresh response from the network.
    Network(FetchResponse),
    /// Stored response, network unavailable.
    Cache {
        cache: CacheName,
        response: FetchResponse,
    },
    /// The not-found page, served for an HTML request nothing else could answer.
    NotFoundPage(FetchResponse),
    /// No response; the caller observes a failed fetch.
    Failed { reason: String },
}

impl FetchOutcome {
    /// The response to hand back to the page, if any.
    pub fn into_response(self) -> Option<FetchResponse> {
        match self {
            FetchOutcome::Network(response)
            | FetchOutcome::Cache { response, .. }
            | FetchOutcome::NotFoundPage(response) => Some(response),
            FetchOutcome::Failed { .. } => None,
        }
    }

    /// Whether the page gets no response.
    pub fn is_failed(&self) -> bool {
        matches!(self, FetchOutcome::Failed { .. })
    }
}

/// The fetch interception strategy. Sole writer of the dynamic cache.
pub struct FetchStrategy {
    caches: Arc<RwLock<CacheStorage>>,
    network: Arc<dyn Network>,
    not_found_url: RwLock<Url>,
    names: CacheConfig,
}

impl FetchStrategy {
    /// Create a strategy over `caches` that serves `not_found_url` as the
    /// not-found page. `names` labels the caches in log output.
    pub fn new(
        caches: Arc<RwLock<CacheStorage>>,
        network: Arc<dyn Network>,
        not_found_url: Url,
        names: CacheConfig,
    ) -> Self {
        Self {
            caches,
            network,
            not_found_url: RwLock::new(not_found_url),
            names,
        }
    }

    /// Point the not-found fallback at a different page URL.
    pub async fn set_not_found_url(&self, url: Url) {
        *self.not_found_url.write().await = url;
    }

    /// Answer an intercepted request.
    pub async fn handle(&self, request: &FetchRequest) -> FetchOutcome {
        let error = match self.network.fetch(request).await {
            Ok(response) => {
                self.remember(request, &response).await;
                return FetchOutcome::Network(response);
            }
            Err(e) => e,
        };

        debug!(url = %request.url, error = %error, "Fetching from server failed");

        if let Some(outcome) = self.from_cache(request).await {
            return outcome;
        }

        if request.accepts_html() {
            if let Some(outcome) = self.not_found_page().await {
                info!(url = %request.url, "Serving not-found page");
                return outcome;
            }
        }

        info!(url = %request.url, "Fetching from server and cache failed");
        FetchOutcome::Failed {
            reason: error.to_string(),
        }
    }

    /// Store a fresh response in the dynamic cache unless it already holds one.
    async fn remember(&self, request: &FetchRequest, response: &FetchResponse) {
        if request.method != Method::GET || response.status == StatusCode::PARTIAL_CONTENT {
            return;
        }

        let key = request.cache_key();
        let entry = CacheEntry::capture(request, response);
        let stored = self.caches.write().await.open(CacheName::Dynamic).put_if_absent(&key, entry);
        let cache = CacheName::Dynamic.label(&self.names);
        if stored {
            debug!(url = %key, cache, "Fetched from server, then cached");
        } else {
            debug!(url = %key, cache, "Fetched from server, cache already holds request");
        }
    }

    async fn from_cache(&self, request: &FetchRequest) -> Option<FetchOutcome> {
        if request.method != Method::GET {
            return None;
        }

        let key = request.cache_key();
        let caches = self.caches.read().await;
        let (cache, entry) = caches.match_url(&key, &CacheName::LOOKUP_ORDER)?;
        match entry.to_response() {
            Ok(response) => {
                info!(url = %key, cache = cache.label(&self.names), "Serving from cache");
                Some(FetchOutcome::Cache { cache, response })
            }
            Err(e) => {
                warn!(url = %key, error = %e, "Cached entry unusable");
                None
            }
        }
    }

    async fn not_found_page(&self) -> Option<FetchOutcome> {
        let key = cache_key(&*self.not_found_url.read().await);
        let caches = self.caches.read().await;
        let entry = caches.get(CacheName::NotFound)?.match_url(&key)?;
        match entry.to_response() {
            Ok(response) => Some(FetchOutcome::NotFoundPage(response)),
            Err(e) => {
                warn!(
                    url = %key,
                    cache = CacheName::NotFound.label(&self.names),
                    error = %e,
                    "Cached not-found page unusable"
                );
                None
            }
        }
    }
}
