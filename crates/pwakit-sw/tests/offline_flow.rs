//! A page going offline and coming back, end to end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hashbrown::HashMap;
use http::StatusCode;
use pwakit_common::PwaConfig;
use pwakit_net::{cache_key, FetchRequest, FetchResponse, NetError, Network};
use pwakit_queue::{ActionHandler, Dispatched, NetworkStatus, OfflineAction, OfflineQueue, QueueError};
use pwakit_store::{KeyValueStore, MemoryStore};
use pwakit_sw::{CacheName, FetchOutcome, ServiceWorker, WorkerEvent, WorkerReply};
use serde::{Deserialize, Serialize};
use url::Url;

const APP: &str = "https://apex.example.com/ords/f?p=1694:1:8812";
const PAGE_1: &str = "https://apex.example.com/ords/f?p=1694:1:8812";
const PAGE_404: &str = "https://apex.example.com/ords/f?p=1694:404:8812";

struct Server {
    pages: HashMap<String, &'static str>,
    offline: AtomicBool,
}

impl Server {
    fn new(pages: &[(&str, &'static str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, body)| (cache_key(&Url::parse(url).unwrap()), *body))
                .collect(),
            offline: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Network for Server {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Offline);
        }
        Ok(match self.pages.get(&request.cache_key()) {
            Some(body) => FetchResponse::ok(request.url.clone(), *body),
            None => FetchResponse::ok(request.url.clone(), "").with_status(StatusCode::NOT_FOUND),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments")]
enum Action {
    #[serde(rename = "something")]
    Something(String),
}

impl OfflineAction for Action {
    fn name(&self) -> &'static str {
        "something"
    }
}

#[derive(Default)]
struct Greeter {
    greeted: Mutex<Vec<String>>,
}

#[async_trait]
impl ActionHandler<Action> for Greeter {
    async fn handle(&self, action: &Action) -> Result<(), QueueError> {
        let Action::Something(who) = action;
        self.greeted.lock().unwrap().push(who.clone());
        Ok(())
    }
}

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

#[tokio::test]
async fn installed_pages_are_served_offline() {
    let server = Arc::new(Server::new(&[
        (PAGE_1, "<html>page 1</html>"),
        (PAGE_404, "<html>not found</html>"),
    ]));
    let (worker, _events) = ServiceWorker::new(PwaConfig::default(), server.clone()).unwrap();
    worker.add_client(url(APP)).await;

    match worker.handle_event(WorkerEvent::Install).await.unwrap() {
        WorkerReply::Installed(report) => assert!(report.is_complete()),
        other => panic!("unexpected reply {other:?}"),
    }
    worker.handle_event(WorkerEvent::Activate).await.unwrap();

    server.offline.store(true, Ordering::SeqCst);

    let page = worker.fetch(&FetchRequest::navigate(url(PAGE_1))).await;
    match page {
        FetchOutcome::Cache { cache, response } => {
            assert_eq!(cache, CacheName::Static);
            assert_eq!(&response.body[..], b"<html>page 1</html>");
        }
        other => panic!("expected cached page, got {other:?}"),
    }

    let unknown = worker
        .fetch(&FetchRequest::navigate(url("https://apex.example.com/ords/f?p=1694:55:8812")))
        .await
        .into_response()
        .unwrap();
    assert_eq!(&unknown.body[..], b"<html>not found</html>");

    let script = worker
        .fetch(&FetchRequest::parse_get("https://apex.example.com/app.js").unwrap())
        .await;
    assert!(script.is_failed());
}

#[tokio::test]
async fn sync_event_replays_queued_actions() {
    let store = Arc::new(MemoryStore::new());
    let greeter = Arc::new(Greeter::default());
    let status = NetworkStatus::new(false);
    let config = PwaConfig::default();

    let queue = Arc::new(
        OfflineQueue::<Action>::open(
            store.clone(),
            greeter.clone(),
            status.clone(),
            config.queue.clone(),
        )
        .await
        .unwrap(),
    );

    let dispatched = queue.dispatch(Action::Something("Alice".into())).await.unwrap();
    assert_eq!(dispatched, Dispatched::Queued);
    assert!(store.get("offline-tasks").await.unwrap().is_some());

    let server = Arc::new(Server::new(&[]));
    let (worker, _events) = ServiceWorker::new(config, server).unwrap();
    let worker = worker.with_background_sync(queue.clone());

    status.set_online(true);
    worker
        .handle_event(WorkerEvent::Sync {
            tag: "pwa-offline-tasks".into(),
        })
        .await
        .unwrap();

    assert_eq!(*greeter.greeted.lock().unwrap(), vec!["Alice".to_string()]);
    assert!(queue.is_empty().await);
    assert_eq!(store.get("offline-tasks").await.unwrap(), None);
}
