//! Named response caches.
//!
//! Three caches exist: pages pre-cached at install time, the not-found page,
//! and responses captured from the live network. Entries are keyed by the
//! canonical request URL (see [`pwakit_net::cache_key`]).

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use pwakit_common::{now_millis, CacheConfig};
use pwakit_net::{FetchRequest, FetchResponse};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::ServiceWorkerError;

/// The caches managed by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheName {
    /// Pages fetched at install time.
    Static,
    /// The not-found page, fetched at install time.
    NotFound,
    /// Responses captured from the network while online.
    Dynamic,
}

impl CacheName {
    /// Caches searched when the network fails, in order.
    pub const LOOKUP_ORDER: [CacheName; 2] = [CacheName::Static, CacheName::Dynamic];

    /// The configured storage name of this cache.
    pub fn label<'a>(&self, config: &'a CacheConfig) -> &'a str {
        match self {
            CacheName::Static => &config.static_name,
            CacheName::NotFound => &config.not_found_name,
            CacheName::Dynamic => &config.dynamic_name,
        }
    }
}

/// A captured response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response headers in received order. Values are kept as raw bytes.
    pub headers: Vec<(String, Bytes)>,

    /// Response body.
    pub body: Bytes,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Capture `response` as the answer to `request`.
    pub fn capture(request: &FetchRequest, response: &FetchResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    Bytes::copy_from_slice(value.as_bytes()),
                )
            })
            .collect();

        Self {
            url: request.cache_key(),
            status: response.status.as_u16(),
            headers,
            body: response.body.clone(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild the response this entry was captured from.
    pub fn to_response(&self) -> Result<FetchResponse, ServiceWorkerError> {
        let url = Url::parse(&self.url)
            .map_err(|e| ServiceWorkerError::CacheError(format!("{}: {}", self.url, e)))?;
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| ServiceWorkerError::CacheError(e.to_string()))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_bytes(value),
            ) {
                (Ok(n), Ok(v)) => {
                    headers.append(n, v);
                }
                _ => warn!(url = %self.url, header = %name, "Dropping unreadable cached header"),
            }
        }

        Ok(FetchResponse {
            url,
            status,
            headers,
            body: self.body.clone(),
        })
    }
}

/// A cache instance.
#[derive(Debug)]
pub struct Cache {
    /// Cache name.
    pub name: CacheName,

    /// Cached entries.
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: CacheName) -> Self {
        Self {
            name,
            entries: HashMap::new(),
        }
    }

    /// Match a request by its cache key.
    pub fn match_url(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store an entry, replacing any previous one.
    pub fn put(&mut self, key: &str, entry: CacheEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    /// Store an entry only if the key is not cached yet. Returns whether it
    /// was stored.
    pub fn put_if_absent(&mut self, key: &str, entry: CacheEntry) -> bool {
        if self.entries.contains_key(key) {
            return false;
        }
        self.entries.insert(key.to_string(), entry);
        true
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Get all keys (URLs).
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All caches of one worker.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<CacheName, Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: CacheName) -> &mut Cache {
        self.caches.entry(name).or_insert_with(|| Cache::new(name))
    }

    /// Get a cache if it has been opened.
    pub fn get(&self, name: CacheName) -> Option<&Cache> {
        self.caches.get(&name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: CacheName) -> bool {
        self.caches.contains_key(&name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: CacheName) -> bool {
        self.caches.remove(&name).is_some()
    }

    /// Match across `order`, returning the first hit and the cache it came from.
    pub fn match_url(&self, key: &str, order: &[CacheName]) -> Option<(CacheName, &CacheEntry)> {
        order.iter().find_map(|name| {
            self.caches
                .get(name)
                .and_then(|cache| cache.match_url(key))
                .map(|entry| (*name, entry))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    fn entry(url: &str, body: &str) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            status: 200,
            headers: vec![("content-type".to_string(), Bytes::from_static(b"text/html"))],
            body: Bytes::from(body.to_string()),
            cached_at: 0,
        }
    }

    #[test]
    fn test_put_replaces() {
        let mut cache = Cache::new(CacheName::Static);
        cache.put("https://example.com/a", entry("https://example.com/a", "v1"));
        cache.put("https://example.com/a", entry("https://example.com/a", "v2"));

        assert_eq!(cache.len(), 1);
        assert_eq!(&cache.match_url("https://example.com/a").unwrap().body[..], b"v2");
    }

    #[test]
    fn test_put_if_absent_keeps_first() {
        let mut cache = Cache::new(CacheName::Dynamic);
        assert!(cache.put_if_absent("k", entry("https://example.com/k", "first")));
        assert!(!cache.put_if_absent("k", entry("https://example.com/k", "second")));

        assert_eq!(&cache.match_url("k").unwrap().body[..], b"first");
    }

    #[test]
    fn test_cache_delete() {
        let mut cache = Cache::new(CacheName::Dynamic);
        cache.put("k", entry("https://example.com/k", "x"));
        assert!(cache.delete("k"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_storage_open_creates() {
        let mut storage = CacheStorage::new();
        assert!(!storage.has(CacheName::Static));

        storage.open(CacheName::Static);
        assert!(storage.has(CacheName::Static));

        assert!(storage.delete(CacheName::Static));
        assert!(!storage.has(CacheName::Static));
    }

    #[test]
    fn test_storage_lookup_order() {
        let mut storage = CacheStorage::new();
        storage.open(CacheName::Dynamic).put("k", entry("https://example.com/k", "dynamic"));
        storage.open(CacheName::Static).put("k", entry("https://example.com/k", "static"));
        storage.open(CacheName::NotFound).put("nf", entry("https://example.com/nf", "404"));

        let (name, hit) = storage.match_url("k", &CacheName::LOOKUP_ORDER).unwrap();
        assert_eq!(name, CacheName::Static);
        assert_eq!(&hit.body[..], b"static");

        // The not-found cache is not part of the regular lookup.
        assert!(storage.match_url("nf", &CacheName::LOOKUP_ORDER).is_none());
    }

    #[test]
    fn test_labels_follow_config() {
        let config = CacheConfig::default();
        assert_eq!(CacheName::Static.label(&config), "static-cache");
        assert_eq!(CacheName::NotFound.label(&config), "404-cache");
        assert_eq!(CacheName::Dynamic.label(&config), "dynamic-cache");
    }

    #[test]
    fn test_capture_round_trips_response() {
        let url = Url::parse("https://example.com/ords/f?p=1694:1#frag").unwrap();
        let request = FetchRequest::get(url.clone());
        let response = FetchResponse::ok(url, "<html>1</html>")
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));

        let captured = CacheEntry::capture(&request, &response);
        assert_eq!(captured.url, "https://example.com/ords/f?p=1694:1");

        let rebuilt = captured.to_response().unwrap();
        assert_eq!(rebuilt.status, StatusCode::OK);
        assert_eq!(rebuilt.body, response.body);
        assert_eq!(rebuilt.content_type(), Some("text/html"));
    }

    #[test]
    fn test_capture_keeps_opaque_header_bytes() {
        let url = Url::parse("https://example.com/export").unwrap();
        let request = FetchRequest::get(url.clone());
        let disposition = HeaderValue::from_bytes(b"attachment; filename=caf\xe9.csv").unwrap();
        assert!(disposition.to_str().is_err());

        let response = FetchResponse::ok(url, "a;b")
            .header(header::CONTENT_DISPOSITION, disposition.clone())
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));

        let captured = CacheEntry::capture(&request, &response);
        assert_eq!(captured.headers.len(), 2);

        let rebuilt = captured.to_response().unwrap();
        assert_eq!(rebuilt.headers, response.headers);
        assert_eq!(rebuilt.headers.get(header::CONTENT_DISPOSITION), Some(&disposition));
    }

    #[test]
    fn test_entry_survives_json_with_opaque_header() {
        let mut original = entry("https://example.com/k", "body");
        original
            .headers
            .push(("x-raw".to_string(), Bytes::from_static(b"\xff\x80ok")));

        let json = serde_json::to_string(&original).unwrap();
        let restored: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
    }
}
