//! Test doubles shared by the unit tests of this crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hashbrown::HashMap;
use http::StatusCode;
use pwakit_net::{cache_key, FetchRequest, FetchResponse, NetError, Network};
use tokio::sync::RwLock;
use url::Url;

/// A network that answers from a table and can be switched off.
#[derive(Default)]
pub(crate) struct FakeNetwork {
    responses: RwLock<HashMap<String, FetchResponse>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    /// Suffix every body with `#<call number>`.
    numbered: AtomicBool,
    /// Per-call delays, consumed in call order.
    delays: Mutex<Vec<Duration>>,
}

impl FakeNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn serve(&self, url: &str, body: &str) {
        let url = Url::parse(url).unwrap();
        self.serve_response(FetchResponse::ok(url, body.to_string()))
            .await;
    }

    pub(crate) async fn serve_response(&self, response: FetchResponse) {
        self.responses
            .write()
            .await
            .insert(cache_key(&response.url), response);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every response body unique by appending the call number.
    pub(crate) fn number_bodies(&self) {
        self.numbered.store(true, Ordering::SeqCst);
    }

    /// Hold the n-th call for `delays[n]` before answering.
    pub(crate) fn delay_calls(&self, delays: Vec<Duration>) {
        *self.delays.lock().unwrap() = delays;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = {
            let mut delays = self.delays.lock().unwrap();
            (!delays.is_empty()).then(|| delays.remove(0))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Offline);
        }
        let mut response = self
            .responses
            .read()
            .await
            .get(&request.cache_key())
            .cloned()
            .unwrap_or_else(|| {
                FetchResponse::ok(request.url.clone(), "").with_status(StatusCode::NOT_FOUND)
            });
        if self.numbered.load(Ordering::SeqCst) {
            let mut body = response.body.to_vec();
            body.extend_from_slice(format!("#{call}").as_bytes());
            response.body = body.into();
        }
        Ok(response)
    }
}
