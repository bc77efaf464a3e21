//! Integration tests for the Firebase Realtime Database client against a
//! mock REST endpoint.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use shopez_core::{ProductId, Uid};
use shopez_integration_tests::{local_client, product, serve};
use shopez_storefront::cache::{LocalCache, MemoryCache, cart_key};
use shopez_storefront::cart::{CartLine, CartReconciler};
use shopez_storefront::identity::{IdentityProvider, MemoryIdentity, Session};
use shopez_storefront::session::SessionGate;
use shopez_storefront::store::{FirebaseDatabase, RealtimeStore, StoreError, StorePath};

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: String,
    body: String,
}

#[derive(Clone, Default)]
struct Database {
    requests: Arc<Mutex<Vec<Recorded>>>,
    streams: Arc<AtomicUsize>,
}

impl Database {
    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn streams_opened(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }
}

/// The event stream for `carts/u1`: initial value, a keep-alive, a patch,
/// then the server closes the connection.
const CART_STREAM: &str = concat!(
    "event: put\n",
    "data: {\"path\":\"/\",\"data\":{\"1\":{\"id\":1,\"title\":\"Backpack\",\"price\":109.95,\"category\":\"men's clothing\",\"quantity\":2}}}\n",
    "\n",
    "event: keep-alive\n",
    "data: null\n",
    "\n",
    "event: patch\n",
    "data: {\"path\":\"/1\",\"data\":{\"quantity\":4}}\n",
    "\n",
);

/// What every later connection to `carts/u1` sees: the cart as changed by
/// another device while the first connection was down.
const CART_RESYNC: &str = concat!(
    "event: put\n",
    "data: {\"path\":\"/\",\"data\":{\"1\":{\"id\":1,\"title\":\"Backpack\",\"price\":109.95,\"category\":\"men's clothing\",\"quantity\":5}}}\n",
    "\n",
);

async fn handle(
    State(db): State<Database>,
    method: Method,
    uri: Uri,
    body: String,
) -> Response {
    db.requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        body: body.clone(),
    });

    if uri.path().starts_with("/carts/intruder") {
        return (
            StatusCode::UNAUTHORIZED,
            "{\"error\":\"Permission denied\"}",
        )
            .into_response();
    }

    match method {
        Method::GET => {
            let stream = if db.streams.fetch_add(1, Ordering::SeqCst) == 0 {
                CART_STREAM
            } else {
                CART_RESYNC
            };
            ([(header::CONTENT_TYPE, "text/event-stream")], stream).into_response()
        }
        Method::PUT => body.into_response(),
        Method::DELETE => "null".into_response(),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn setup() -> (FirebaseDatabase, Database, MemoryIdentity) {
    let db = Database::default();
    let url = serve(Router::new().fallback(handle).with_state(db.clone()))
        .await
        .unwrap();

    let identity = MemoryIdentity::new();
    identity.set_session(Some(Session::new(Uid::new("u1"), None)));
    let client = FirebaseDatabase::with_client(
        local_client().unwrap(),
        &url,
        Some(Arc::new(identity.clone())),
    );
    (client, db, identity)
}

#[tokio::test]
async fn test_set_line_puts_full_record_with_token() {
    let (client, db, _identity) = setup().await;
    let reconciler = CartReconciler::new(Arc::new(client), Arc::new(MemoryCache::new()));

    let line = CartLine::new(product(1, "Backpack", 10995, "men's clothing"));
    reconciler
        .set_line(&Uid::new("u1"), ProductId::new(1), line)
        .await
        .unwrap();

    let request = &db.requests()[0];
    assert_eq!(request.method, Method::PUT);
    assert_eq!(request.path, "/carts/u1/1.json");
    assert_eq!(request.query, "auth=memory%3Au1");

    let body: Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["id"], json!(1));
    assert_eq!(body["price"], json!(109.95));
    assert_eq!(body["quantity"], json!(1));
    assert!(body["addedAt"].is_i64());
}

#[tokio::test]
async fn test_zero_quantity_deletes() {
    let (client, db, _identity) = setup().await;
    let reconciler = CartReconciler::new(Arc::new(client), Arc::new(MemoryCache::new()));

    let line = CartLine::new(product(1, "Backpack", 10995, "men's clothing"));
    reconciler
        .update_quantity(&Uid::new("u1"), &line, 0)
        .await
        .unwrap();

    let request = &db.requests()[0];
    assert_eq!(request.method, Method::DELETE);
    assert_eq!(request.path, "/carts/u1/1.json");
}

#[tokio::test]
async fn test_rejected_write_is_permission_denied() {
    let (client, _db, _identity) = setup().await;
    let err = client
        .set(&StorePath::parse("carts/intruder/1"), json!({"quantity": 1}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_signed_out_requests_carry_no_token() {
    let (client, db, identity) = setup().await;
    identity.set_session(None);
    client.remove(&StorePath::parse("carts/u1/1")).await.unwrap();
    assert_eq!(db.requests()[0].query, "");
}

#[tokio::test]
async fn test_listener_applies_stream_events() {
    let (client, db, _identity) = setup().await;
    let mut listener = client.subscribe(&StorePath::parse("carts/u1"));

    let first = listener.recv().await.unwrap().unwrap();
    assert_eq!(first["1"]["quantity"], json!(2));

    let patched = listener.recv().await.unwrap().unwrap();
    assert_eq!(patched["1"]["quantity"], json!(4));
    assert_eq!(patched["1"]["title"], json!("Backpack"));

    assert!(matches!(
        listener.recv().await.unwrap(),
        Err(StoreError::Disconnected)
    ));

    // The listener reconnects on its own and picks up the current value.
    let resynced = listener.recv().await.unwrap().unwrap();
    assert_eq!(resynced["1"]["quantity"], json!(5));
    assert!(db.streams_opened() >= 2);
}

#[tokio::test]
async fn test_detached_listener_stops_reconnecting() {
    let (client, db, _identity) = setup().await;
    let mut listener = client.subscribe(&StorePath::parse("carts/u1"));
    listener.recv().await.unwrap().unwrap();

    listener.detach();
    assert!(listener.recv().await.is_none());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(db.streams_opened(), 1);
}

#[tokio::test]
async fn test_dropped_stream_falls_back_to_cache() {
    let (client, _db, _identity) = setup().await;
    let cache = MemoryCache::new();
    let reconciler = CartReconciler::new(Arc::new(client), Arc::new(cache.clone()));
    let uid = Uid::new("u1");

    let mut cart = reconciler.observe(&uid);
    assert_eq!(cart.next().await.unwrap().item_count(), 2);
    let patched = cart.next().await.unwrap();
    assert_eq!(patched.item_count(), 4);
    assert_eq!(patched.total_label(), "$439.80");

    // The connection closed; the last mirrored cart is shown.
    assert_eq!(cart.next().await.unwrap(), patched);

    // Then the subscription carries on with the reconnected stream.
    assert_eq!(cart.next().await.unwrap().item_count(), 5);
    assert!(cart.is_active());

    let cached = cache.get(&cart_key(&uid)).await.unwrap().unwrap();
    assert!(cached.contains("\"quantity\":5"));
}

#[tokio::test]
async fn test_bound_cart_resyncs_after_stream_drop() {
    let (client, _db, identity) = setup().await;
    let reconciler = CartReconciler::new(Arc::new(client), Arc::new(MemoryCache::new()));
    let gate = SessionGate::new(identity.observe());

    let binding = gate.bind_cart(reconciler);
    let mut state = binding.state();
    let resynced = tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| s.item_count() == 5),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(resynced.uid, Some(Uid::new("u1")));
}
