//! Install-time population of the static and not-found caches.

use futures::future::join_all;
use pwakit_common::{CacheConfig, PwaConfig};
use pwakit_net::{FetchRequest, Network};
use tracing::{error, info};
use url::Url;

use crate::cache::{CacheEntry, CacheName, CacheStorage};
use crate::ServiceWorkerError;

/// URLs fetched at install time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUrls {
    /// Pages for the static cache.
    pub static_urls: Vec<Url>,
    /// The not-found page URL.
    pub not_found_url: Url,
}

impl PageUrls {
    /// Derive page URLs for the configured application.
    ///
    /// A client already showing a page of the application supplies the
    /// template, so the derived URLs keep its session and other query
    /// segments. Without one, `base_url?p=<app>:<page>` is used.
    pub fn derive(config: &PwaConfig, clients: &[Url]) -> Result<Self, ServiceWorkerError> {
        let template = match find_app_client(config.app_id, clients) {
            Some(url) => url.clone(),
            None => {
                let mut url = Url::parse(&config.base_url)
                    .map_err(|e| ServiceWorkerError::RegistrationFailed(e.to_string()))?;
                url.set_query(Some(&format!("p={}", config.app_id)));
                url
            }
        };

        Ok(Self {
            static_urls: config
                .pages
                .iter()
                .map(|page| page_url(&template, *page))
                .collect(),
            not_found_url: page_url(&template, config.not_found_page),
        })
    }
}

/// The first client whose query addresses `app_id` (`p=<app_id>:...`).
fn find_app_client(app_id: u32, clients: &[Url]) -> Option<&Url> {
    let prefix = format!("p={app_id}");
    clients.iter().find(|url| {
        url.query()
            .and_then(|q| q.split(':').next())
            .is_some_and(|first| first == prefix)
    })
}

/// Replace the page segment (the second `:`-separated query segment).
fn page_url(template: &Url, page: u32) -> Url {
    let mut url = template.clone();
    url.set_fragment(None);
    let query = template.query().unwrap_or_default();
    let mut segments: Vec<String> = query.split(':').map(str::to_string).collect();
    if segments.len() > 1 {
        segments[1] = page.to_string();
    } else {
        segments.push(page.to_string());
    }
    url.set_query(Some(&segments.join(":")));
    url
}

/// Outcome of populating both install-time caches.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Entries stored in the static cache, or why the bulk store failed.
    pub static_cache: Result<usize, ServiceWorkerError>,
    /// Entries stored in the not-found cache, or why the bulk store failed.
    pub not_found_cache: Result<usize, ServiceWorkerError>,
}

impl InstallReport {
    /// Whether both caches were fully populated.
    pub fn is_complete(&self) -> bool {
        self.static_cache.is_ok() && self.not_found_cache.is_ok()
    }
}

/// Fetch every URL and store all of them, or store nothing.
///
/// Fails if any fetch fails or answers with a non-2xx status.
pub async fn add_all(
    caches: &tokio::sync::RwLock<CacheStorage>,
    network: &dyn Network,
    name: CacheName,
    urls: &[Url],
) -> Result<usize, ServiceWorkerError> {
    let requests: Vec<FetchRequest> = urls.iter().cloned().map(FetchRequest::get).collect();
    let responses = join_all(requests.iter().map(|request| network.fetch(request))).await;

    let mut entries = Vec::with_capacity(requests.len());
    for (request, response) in requests.iter().zip(responses) {
        let response = response.map_err(|e| {
            ServiceWorkerError::NetworkError(format!("{}: {}", request.url, e))
        })?;
        if !response.is_success() {
            return Err(ServiceWorkerError::CacheError(format!(
                "{} answered {}",
                request.url, response.status
            )));
        }
        entries.push((request.cache_key(), CacheEntry::capture(request, &response)));
    }

    let stored = entries.len();
    let mut caches = caches.write().await;
    let cache = caches.open(name);
    for (key, entry) in entries {
        cache.put(&key, entry);
    }
    Ok(stored)
}

/// Populate the static and not-found caches.
///
/// Waits for both bulk stores. A failure is logged and reported but does not
/// stop the other cache from being populated.
pub async fn install_caches(
    caches: &tokio::sync::RwLock<CacheStorage>,
    network: &dyn Network,
    urls: &PageUrls,
    names: &CacheConfig,
) -> InstallReport {
    let not_found = std::slice::from_ref(&urls.not_found_url);
    let (static_cache, not_found_cache) = futures::join!(
        add_all(caches, network, CacheName::Static, &urls.static_urls),
        add_all(caches, network, CacheName::NotFound, not_found),
    );

    for (name, result) in [
        (CacheName::Static, &static_cache),
        (CacheName::NotFound, &not_found_cache),
    ] {
        let cache = name.label(names);
        match result {
            Ok(count) => info!(cache, count, "Cached install-time pages"),
            Err(e) => error!(cache, error = %e, "Bulk cache population failed"),
        }
    }

    InstallReport {
        static_cache,
        not_found_cache,
    }
}
