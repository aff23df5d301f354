//! End-to-end replication tests against a miniature in-process remote
//! replica.
//!
//! The stub speaks just enough of the remote's HTTP surface for the engine:
//! health probe, collection existence/create/delete, `_all_docs`,
//! long-poll `_changes`, and `_bulk_docs`. Everything runs on a loopback
//! listener; no network access is needed.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::time::Instant;

use shopkeeper_core::{Article, Business};
use shopkeeper_store::Store;
use shopkeeper_sync::{
    ConnectivityMonitor, EndpointDiscovery, RemoteClient, ReplicationSession, SessionSettings,
    SessionState, SyncConfig, SyncController, SyncError,
};

// =============================================================================
// Remote Replica Stub
// =============================================================================

struct StubCollection {
    docs: BTreeMap<String, Value>,
    log: Vec<(u64, String, bool)>,
    seq: u64,
    rev_counter: u64,
}

impl StubCollection {
    fn new() -> Self {
        StubCollection {
            docs: BTreeMap::new(),
            log: Vec::new(),
            seq: 0,
            rev_counter: 0,
        }
    }

    fn put_doc(&mut self, id: &str, mut doc: Value) -> String {
        self.rev_counter += 1;
        let rev = format!("{}-stub", self.rev_counter);
        if let Some(obj) = doc.as_object_mut() {
            obj.insert("_id".to_string(), json!(id));
            obj.insert("_rev".to_string(), json!(rev));
        }
        self.docs.insert(id.to_string(), doc);
        self.seq += 1;
        self.log.push((self.seq, id.to_string(), false));
        rev
    }

    fn delete_doc(&mut self, id: &str) -> String {
        self.rev_counter += 1;
        let rev = format!("{}-stub", self.rev_counter);
        self.docs.remove(id);
        self.seq += 1;
        self.log.push((self.seq, id.to_string(), true));
        rev
    }
}

struct StubState {
    collections: Mutex<HashMap<String, StubCollection>>,
    notify: Notify,
    healthy: AtomicBool,
    probes: AtomicUsize,
    requests: AtomicUsize,
}

#[derive(Clone)]
struct StubReplica {
    url: String,
    state: Arc<StubState>,
}

impl StubReplica {
    fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    fn probe_count(&self) -> usize {
        self.state.probes.load(Ordering::SeqCst)
    }

    fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    fn doc_count(&self, collection: &str) -> usize {
        self.state
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|c| c.docs.len())
            .unwrap_or(0)
    }

    fn get_doc(&self, collection: &str, id: &str) -> Option<Value> {
        self.state
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|c| c.docs.get(id).cloned())
    }

    fn insert_remote_doc(&self, collection: &str, doc: Value) {
        let id = doc["id"].as_str().expect("doc needs an id").to_string();
        {
            let mut collections = self.state.collections.lock().unwrap();
            collections
                .get_mut(collection)
                .expect("unknown stub collection")
                .put_doc(&id, doc);
        }
        self.state.notify.notify_waiters();
    }
}

async fn spawn_stub(collections: &[&str]) -> StubReplica {
    let mut map = HashMap::new();
    for name in collections {
        map.insert(name.to_string(), StubCollection::new());
    }

    let state = Arc::new(StubState {
        collections: Mutex::new(map),
        notify: Notify::new(),
        healthy: AtomicBool::new(true),
        probes: AtomicUsize::new(0),
        requests: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/", get(stub_root))
        .route(
            "/{collection}",
            put(stub_create_collection).delete(stub_delete_collection),
        )
        .route("/{collection}/", get(stub_collection_info))
        .route("/{collection}/_all_docs", get(stub_all_docs))
        .route("/{collection}/_changes", get(stub_changes))
        .route("/{collection}/_bulk_docs", post(stub_bulk_docs))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    StubReplica {
        url: format!("http://{addr}"),
        state,
    }
}

async fn stub_root(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.probes.fetch_add(1, Ordering::SeqCst);
    state.requests.fetch_add(1, Ordering::SeqCst);

    // Every request must carry Basic credentials.
    if !headers.contains_key("authorization") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized"})),
        );
    }
    if !state.healthy.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "unhealthy"})),
        );
    }
    (StatusCode::OK, Json(json!({"ok": true})))
}

async fn stub_collection_info(
    State(state): State<Arc<StubState>>,
    Path(collection): Path<String>,
) -> (StatusCode, Json<Value>) {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let collections = state.collections.lock().unwrap();
    match collections.get(&collection) {
        Some(c) => (
            StatusCode::OK,
            Json(json!({"db_name": collection, "doc_count": c.docs.len()})),
        ),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "not_found"}))),
    }
}

async fn stub_create_collection(
    State(state): State<Arc<StubState>>,
    Path(collection): Path<String>,
) -> (StatusCode, Json<Value>) {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let mut collections = state.collections.lock().unwrap();
    if collections.contains_key(&collection) {
        return (
            StatusCode::PRECONDITION_FAILED,
            Json(json!({"error": "file_exists"})),
        );
    }
    collections.insert(collection, StubCollection::new());
    (StatusCode::CREATED, Json(json!({"ok": true})))
}

async fn stub_delete_collection(
    State(state): State<Arc<StubState>>,
    Path(collection): Path<String>,
) -> (StatusCode, Json<Value>) {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let mut collections = state.collections.lock().unwrap();
    match collections.remove(&collection) {
        Some(_) => (StatusCode::OK, Json(json!({"ok": true}))),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "not_found"}))),
    }
}

async fn stub_all_docs(
    State(state): State<Arc<StubState>>,
    Path(collection): Path<String>,
) -> (StatusCode, Json<Value>) {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let collections = state.collections.lock().unwrap();
    match collections.get(&collection) {
        Some(c) => (
            StatusCode::OK,
            Json(json!({"total_rows": c.docs.len(), "offset": 0, "rows": []})),
        ),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "not_found"}))),
    }
}

async fn stub_changes(
    State(state): State<Arc<StubState>>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    state.requests.fetch_add(1, Ordering::SeqCst);

    let since: u64 = params
        .get("since")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let limit: usize = params
        .get("limit")
        .and_then(|s| s.parse().ok())
        .unwrap_or(100);
    let longpoll = params.get("feed").map(|f| f == "longpoll").unwrap_or(false);
    let wait_ms: u64 = params
        .get("timeout")
        .and_then(|s| s.parse().ok())
        .unwrap_or(5_000)
        .min(5_000);
    let deadline = Instant::now() + Duration::from_millis(wait_ms);

    loop {
        // Arm the wakeup before scanning so a write in between is not lost.
        let notified = state.notify.notified();

        {
            let collections = state.collections.lock().unwrap();
            let Some(c) = collections.get(&collection) else {
                return (StatusCode::NOT_FOUND, Json(json!({"error": "not_found"})));
            };

            let mut results = Vec::new();
            let mut last_seq = since;
            for (seq, id, deleted) in c.log.iter().filter(|(seq, _, _)| *seq > since) {
                if results.len() >= limit {
                    break;
                }
                last_seq = *seq;
                if *deleted || !c.docs.contains_key(id) {
                    results.push(json!({"id": id, "deleted": true}));
                } else {
                    results.push(json!({"id": id, "doc": c.docs[id]}));
                }
            }

            if !results.is_empty() || !longpoll {
                return (
                    StatusCode::OK,
                    Json(json!({"results": results, "last_seq": last_seq.to_string()})),
                );
            }
        }

        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep_until(deadline) => {
                return (
                    StatusCode::OK,
                    Json(json!({"results": [], "last_seq": since.to_string()})),
                );
            }
        }
    }
}

async fn stub_bulk_docs(
    State(state): State<Arc<StubState>>,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.requests.fetch_add(1, Ordering::SeqCst);

    let docs = body["docs"].as_array().cloned().unwrap_or_default();
    let mut results = Vec::new();

    {
        let mut collections = state.collections.lock().unwrap();
        let Some(c) = collections.get_mut(&collection) else {
            return (StatusCode::NOT_FOUND, Json(json!({"error": "not_found"})));
        };

        for doc in docs {
            let Some(id) = doc["_id"].as_str().map(str::to_string) else {
                results.push(json!({"error": "bad_request", "reason": "missing _id"}));
                continue;
            };

            let current_rev = c
                .docs
                .get(&id)
                .and_then(|d| d["_rev"].as_str())
                .map(str::to_string);
            let given_rev = doc["_rev"].as_str().map(str::to_string);

            // Naive head check: updating an existing doc needs its rev.
            if current_rev.is_some() && given_rev != current_rev {
                results.push(json!({"id": id, "error": "conflict", "reason": "rev mismatch"}));
                continue;
            }

            let deleted = doc["_deleted"].as_bool().unwrap_or(false);
            let rev = if deleted {
                c.delete_doc(&id)
            } else {
                c.put_doc(&id, doc)
            };
            results.push(json!({"ok": true, "id": id, "rev": rev}));
        }
    }

    state.notify.notify_waiters();
    (StatusCode::CREATED, Json(json!(results)))
}

// =============================================================================
// Test Helpers
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("shopkeeper_sync=debug,shopkeeper_store=debug")
        .try_init();
}

fn test_config(candidate_urls: Vec<String>) -> SyncConfig {
    let mut config = SyncConfig::default();
    config.remote.candidate_urls = candidate_urls;
    config.remote.username = "admin".into();
    config.remote.password = "secret".into();
    config.remote.probe_timeout_secs = 2;
    config.sync.batch_size = 10;
    config.sync.debounce_ms = 100;
    config.sync.longpoll_timeout_secs = 1;
    config.sync.settle_delay_secs = 0;
    config
}

fn test_client() -> RemoteClient {
    RemoteClient::new("admin", "secret", Duration::from_secs(2)).unwrap()
}

fn test_settings() -> SessionSettings {
    SessionSettings::from(&test_config(Vec::new()))
}

/// Polls an async condition until it holds or the timeout elapses.
async fn wait_until<F, Fut>(description: &str, timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for: {description}");
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test]
async fn discovery_returns_first_healthy_candidate_and_persists_it() {
    init_tracing();
    let unhealthy = spawn_stub(&[]).await;
    unhealthy.set_healthy(false);
    let healthy = spawn_stub(&["businesses", "articles"]).await;

    let store = Store::open_in_memory().await.unwrap();
    let discovery = EndpointDiscovery::new(
        vec![unhealthy.url.clone(), healthy.url.clone()],
        test_client(),
        store.cache().clone(),
    );

    // First call walks the list in order: the unhealthy candidate is
    // probed once, then the healthy one wins.
    let url = discovery.discover().await.unwrap();
    assert_eq!(url, healthy.url);
    assert_eq!(unhealthy.probe_count(), 1);
    assert_eq!(
        store.cache().last_good_url().await.unwrap(),
        Some(healthy.url.clone())
    );

    // Second call probes the persisted last-good URL FIRST; the earlier
    // candidate is not contacted again.
    let url = discovery.discover().await.unwrap();
    assert_eq!(url, healthy.url);
    assert_eq!(unhealthy.probe_count(), 1);
}

#[tokio::test]
async fn discovery_fails_when_nothing_answers() {
    init_tracing();
    let unhealthy = spawn_stub(&[]).await;
    unhealthy.set_healthy(false);

    let store = Store::open_in_memory().await.unwrap();
    let discovery = EndpointDiscovery::new(
        vec![unhealthy.url.clone()],
        test_client(),
        store.cache().clone(),
    );

    let err = discovery.discover().await.unwrap_err();
    assert!(matches!(err, SyncError::NoEndpointAvailable { probed: 1 }));
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn session_start_requires_remote_collection() {
    init_tracing();
    let stub = spawn_stub(&["businesses"]).await;
    let store = Store::open_in_memory().await.unwrap();

    let err = ReplicationSession::start(
        "articles",
        &stub.url,
        test_client(),
        &store,
        test_settings(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SyncError::RemoteNotFound { .. }));
}

#[tokio::test]
async fn session_stop_is_an_idempotent_no_op() {
    init_tracing();
    let stub = spawn_stub(&["businesses", "articles"]).await;
    let store = Store::open_in_memory().await.unwrap();

    let mut session = ReplicationSession::start(
        "businesses",
        &stub.url,
        test_client(),
        &store,
        test_settings(),
    )
    .await
    .unwrap();
    assert_eq!(session.state(), SessionState::Active);

    session.stop().await;
    assert_eq!(session.state(), SessionState::Stopped);

    // Stopping again must neither panic nor change anything.
    session.stop().await;
    session.stop().await;
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn session_pushes_local_mutations() {
    init_tracing();
    let stub = spawn_stub(&["businesses", "articles"]).await;
    let store = Store::open_in_memory().await.unwrap();

    let mut session = ReplicationSession::start(
        "businesses",
        &stub.url,
        test_client(),
        &store,
        test_settings(),
    )
    .await
    .unwrap();

    store
        .businesses()
        .add(Business::with_id("b1", "Acme"))
        .await
        .unwrap();

    wait_until("push to reach the remote", Duration::from_secs(5), || {
        let stub = stub.clone();
        async move { stub.doc_count("businesses") == 1 }
    })
    .await;

    let doc = stub.get_doc("businesses", "b1").unwrap();
    assert_eq!(doc["name"], "Acme");
    assert_eq!(doc["_id"], "b1");

    // An update flows through the same channel, revising the remote head.
    store
        .businesses()
        .update(Business::with_id("b1", "Acme Ltd"))
        .await
        .unwrap();

    wait_until("update to reach the remote", Duration::from_secs(5), || {
        let stub = stub.clone();
        async move {
            stub.get_doc("businesses", "b1")
                .map(|d| d["name"] == "Acme Ltd")
                .unwrap_or(false)
        }
    })
    .await;

    // A delete travels as a tombstone.
    assert!(store.businesses().delete("b1").await.unwrap());
    wait_until("delete to reach the remote", Duration::from_secs(5), || {
        let stub = stub.clone();
        async move { stub.doc_count("businesses") == 0 }
    })
    .await;

    session.stop().await;
}

#[tokio::test]
async fn session_pulls_remote_documents_and_flushes_them() {
    init_tracing();
    let stub = spawn_stub(&["businesses", "articles"]).await;
    let store = Store::open_in_memory().await.unwrap();

    let mut session = ReplicationSession::start(
        "articles",
        &stub.url,
        test_client(),
        &store,
        test_settings(),
    )
    .await
    .unwrap();

    stub.insert_remote_doc(
        "articles",
        json!({
            "id": "a9",
            "name": "Remote Widget",
            "qty": 3,
            "selling_price": 4.5,
            "business_id": "b1"
        }),
    );

    wait_until("pull to apply locally", Duration::from_secs(5), || {
        let articles = store.articles();
        async move { articles.get_by_id("a9").is_some() }
    })
    .await;

    let article = store.articles().get_by_id("a9").unwrap();
    assert_eq!(article.name, "Remote Widget");
    assert_eq!(article.qty, 3);

    // The debounced flush mirrors the pulled batch into the cache.
    wait_until("debounced flush", Duration::from_secs(5), || {
        let cache = store.cache().clone();
        async move {
            cache
                .snapshot("articles")
                .await
                .ok()
                .flatten()
                .map(|json| json.contains("\"a9\""))
                .unwrap_or(false)
        }
    })
    .await;

    session.stop().await;
}

// =============================================================================
// Controller
// =============================================================================

#[tokio::test]
async fn offline_mutations_never_touch_the_remote() {
    init_tracing();
    let stub = spawn_stub(&["businesses", "articles"]).await;
    let store = Store::open_in_memory().await.unwrap();
    let connectivity = ConnectivityMonitor::new(false);

    let controller = SyncController::new(
        test_config(vec![stub.url.clone()]),
        store.clone(),
        connectivity,
    )
    .unwrap();
    controller.start().await;

    store
        .businesses()
        .add(Business::with_id("b2", "Offline Co"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The Durable Cache has the mutation; the stub saw zero requests.
    let snapshot = store.cache().snapshot("businesses").await.unwrap().unwrap();
    assert!(snapshot.contains("\"b2\""));
    assert_eq!(stub.request_count(), 0);

    controller.shutdown().await;
}

#[tokio::test]
async fn online_transition_discovers_once_and_starts_each_collection_once() {
    init_tracing();
    let stub = spawn_stub(&["businesses", "articles"]).await;
    let store = Store::open_in_memory().await.unwrap();
    let connectivity = ConnectivityMonitor::new(false);

    let controller = SyncController::new(
        test_config(vec![stub.url.clone()]),
        store,
        connectivity.clone(),
    )
    .unwrap();
    controller.start().await;

    // Two rapid same-state notifications are one edge.
    connectivity.set_online(true);
    connectivity.set_online(true);

    wait_until("sessions to come up", Duration::from_secs(5), || {
        let controller = controller.clone();
        async move {
            let status = controller.status().await;
            status.is_active("businesses") && status.is_active("articles")
        }
    })
    .await;

    // Exactly one discovery attempt for the single edge.
    assert_eq!(stub.probe_count(), 1);

    let status = controller.status().await;
    assert!(status.is_online);
    assert_eq!(status.current_url, Some(stub.url.clone()));
    assert_eq!(status.per_collection_active().len(), 2);

    // Going offline stops everything immediately.
    connectivity.set_online(false);
    wait_until("sessions to stop", Duration::from_secs(5), || {
        let controller = controller.clone();
        async move { controller.status().await.collections.is_empty() }
    })
    .await;

    controller.shutdown().await;
}

#[tokio::test]
async fn full_round_trip_between_two_devices() {
    init_tracing();
    let stub = spawn_stub(&["businesses", "articles"]).await;

    // Device A pushes its dataset.
    let device_a = Store::open_in_memory().await.unwrap();
    let controller_a = SyncController::new(
        test_config(vec![stub.url.clone()]),
        device_a.clone(),
        ConnectivityMonitor::new(true),
    )
    .unwrap();
    assert!(controller_a.start().await.success);

    device_a
        .businesses()
        .add(Business::with_id("b1", "Acme"))
        .await
        .unwrap();
    device_a
        .articles()
        .add(Article::with_id("a1", "Widget", 5, 9.99, "b1"))
        .await
        .unwrap();

    wait_until("device A push", Duration::from_secs(5), || {
        let stub = stub.clone();
        async move { stub.doc_count("businesses") == 1 && stub.doc_count("articles") == 1 }
    })
    .await;

    // Device B pulls it all down.
    let device_b = Store::open_in_memory().await.unwrap();
    let controller_b = SyncController::new(
        test_config(vec![stub.url.clone()]),
        device_b.clone(),
        ConnectivityMonitor::new(true),
    )
    .unwrap();
    assert!(controller_b.start().await.success);

    wait_until("device B pull", Duration::from_secs(5), || {
        let articles = device_b.articles();
        async move { articles.get_by_id("a1").is_some() }
    })
    .await;

    let found = device_b.articles().find_by_business("b1");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Widget");

    controller_a.shutdown().await;
    controller_b.shutdown().await;
}

#[tokio::test]
async fn permanent_delete_recreates_empty_remote_collections() {
    init_tracing();
    let stub = spawn_stub(&["businesses", "articles"]).await;
    let store = Store::open_in_memory().await.unwrap();

    let controller = SyncController::new(
        test_config(vec![stub.url.clone()]),
        store.clone(),
        ConnectivityMonitor::new(true),
    )
    .unwrap();
    assert!(controller.start().await.success);

    store
        .businesses()
        .add(Business::with_id("b1", "Acme"))
        .await
        .unwrap();
    wait_until("push before reset", Duration::from_secs(5), || {
        let stub = stub.clone();
        async move { stub.doc_count("businesses") == 1 }
    })
    .await;

    let outcome = controller.permanently_delete_all_data(true).await;
    assert!(outcome.success, "{}", outcome.message);

    // Local copies are empty, and the remote collections exist but are
    // empty again.
    assert_eq!(store.businesses().count(), 0);
    assert_eq!(
        store.cache().snapshot("businesses").await.unwrap(),
        None
    );
    assert_eq!(stub.doc_count("businesses"), 0);
    assert_eq!(stub.doc_count("articles"), 0);

    controller.shutdown().await;
}
