//! Firebase Realtime Database client.
//!
//! Uses the REST protocol: `PUT`/`DELETE` on `{db}/{path}.json` for writes,
//! and a `text/event-stream` GET on the same URL for subscriptions. Requests
//! carry the signed-in user's ID token as `?auth=`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use url::Url;

use super::sse::{SseEvent, SseParser};
use super::{Listener, RealtimeStore, StoreError, StoreEvent, StorePath, tree};
use crate::identity::IdTokenSource;

/// Delay before the first reconnect of a dropped event stream.
const RECONNECT_DELAY: Duration = Duration::from_millis(250);
/// Upper bound of the doubling reconnect delay.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Client for a Firebase Realtime Database.
#[derive(Clone)]
pub struct FirebaseDatabase {
    inner: Arc<FirebaseDatabaseInner>,
}

struct FirebaseDatabaseInner {
    client: reqwest::Client,
    base_url: String,
    tokens: Option<Arc<dyn IdTokenSource>>,
}

/// Body of `put` and `patch` stream events.
#[derive(Debug, Deserialize)]
struct EventBody {
    path: String,
    data: Value,
}

/// What a stream event did to the local snapshot.
#[derive(Debug, PartialEq, Eq)]
enum Applied {
    Changed,
    Ignored,
}

impl FirebaseDatabase {
    /// Create a client that authenticates with the user's ID token.
    #[must_use]
    pub fn new(database_url: &Url, tokens: Arc<dyn IdTokenSource>) -> Self {
        Self::with_client(reqwest::Client::new(), database_url, Some(tokens))
    }

    /// Create a client that sends no credentials (open rules or emulator).
    #[must_use]
    pub fn anonymous(database_url: &Url) -> Self {
        Self::with_client(reqwest::Client::new(), database_url, None)
    }

    /// Create a client with a custom `reqwest::Client`.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        database_url: &Url,
        tokens: Option<Arc<dyn IdTokenSource>>,
    ) -> Self {
        Self {
            inner: Arc::new(FirebaseDatabaseInner {
                client,
                base_url: database_url.as_str().trim_end_matches('/').to_string(),
                tokens,
            }),
        }
    }
}

impl FirebaseDatabaseInner {
    /// REST URL for a path, with the auth token when there is one.
    fn url(&self, path: &StorePath, token: Option<&SecretString>) -> String {
        let encoded: Vec<_> = path
            .segments()
            .iter()
            .map(|s| urlencoding::encode(s))
            .collect();
        let mut url = format!("{}/{}.json", self.base_url, encoded.join("/"));
        if let Some(token) = token {
            url.push_str("?auth=");
            url.push_str(&urlencoding::encode(token.expose_secret()));
        }
        url
    }

    async fn token(&self) -> Result<Option<SecretString>, StoreError> {
        match &self.tokens {
            Some(tokens) => tokens
                .id_token()
                .await
                .map_err(|e| StoreError::PermissionDenied(e.to_string())),
            None => Ok(None),
        }
    }

    /// Turn a non-success response into an error.
    async fn check(path: &StorePath, response: reqwest::Response) -> Result<(), StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if matches!(
            status,
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN
        ) {
            return Err(StoreError::PermissionDenied(path.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            status = %status,
            path = %path,
            body = %body.chars().take(500).collect::<String>(),
            "Realtime database returned non-success status"
        );
        Err(StoreError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}

/// Apply one stream event to the snapshot of a listener.
fn apply_event(snapshot: &mut Value, event: &SseEvent) -> Result<Applied, StoreError> {
    match event.event.as_str() {
        "put" => {
            let body: EventBody = serde_json::from_str(&event.data)?;
            tree::set(snapshot, &StorePath::parse(&body.path), body.data);
            Ok(Applied::Changed)
        }
        "patch" => {
            let body: EventBody = serde_json::from_str(&event.data)?;
            let Value::Object(children) = body.data else {
                return Err(StoreError::Unavailable(format!(
                    "patch at {} is not an object",
                    body.path
                )));
            };
            tree::merge(snapshot, &StorePath::parse(&body.path), children);
            Ok(Applied::Changed)
        }
        "keep-alive" => Ok(Applied::Ignored),
        "cancel" => Err(StoreError::Cancelled(event.data.clone())),
        "auth_revoked" => Err(StoreError::PermissionDenied(
            "credential no longer valid".to_string(),
        )),
        other => {
            debug!(event = other, "Ignoring unknown stream event");
            Ok(Applied::Ignored)
        }
    }
}

#[async_trait]
impl RealtimeStore for FirebaseDatabase {
    fn subscribe(&self, path: &StorePath) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::clone(&self.inner);
        let listen_path = path.clone();

        let task = tokio::spawn(async move {
            let mut delay = RECONNECT_DELAY;
            loop {
                let mut connected = false;
                match listen(&inner, &listen_path, &tx, &mut connected).await {
                    Ok(()) => return,
                    Err(e) => {
                        warn!(path = %listen_path, error = %e, "Realtime listener dropped, reconnecting");
                        if tx.send(Err(e)).is_err() {
                            return;
                        }
                    }
                }
                if connected {
                    delay = RECONNECT_DELAY;
                }
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_RECONNECT_DELAY);
            }
        });

        Listener::new(path.clone(), rx, move || task.abort())
    }

    #[instrument(skip(self, value), fields(path = %path))]
    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        let token = self.inner.token().await?;
        let response = self
            .inner
            .client
            .put(self.inner.url(path, token.as_ref()))
            .json(&value)
            .send()
            .await?;
        FirebaseDatabaseInner::check(path, response).await
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        let token = self.inner.token().await?;
        let response = self
            .inner
            .client
            .delete(self.inner.url(path, token.as_ref()))
            .send()
            .await?;
        FirebaseDatabaseInner::check(path, response).await
    }
}

/// Read one event stream for `path`, forwarding the full value after every
/// change. Returns `Ok` when the listener side has gone away; any error ends
/// this connection and the caller reconnects with a fresh token.
async fn listen(
    inner: &FirebaseDatabaseInner,
    path: &StorePath,
    events: &mpsc::UnboundedSender<StoreEvent>,
    connected: &mut bool,
) -> Result<(), StoreError> {
    let token = inner.token().await?;
    let response = inner
        .client
        .get(inner.url(path, token.as_ref()))
        .header("Accept", "text/event-stream")
        .send()
        .await?;

    if !response.status().is_success() {
        FirebaseDatabaseInner::check(path, response).await?;
        return Err(StoreError::Disconnected);
    }
    *connected = true;
    debug!(path = %path, "Realtime listener connected");

    let mut parser = SseParser::new();
    let mut snapshot = Value::Null;
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        for event in parser.feed(&chunk?) {
            if apply_event(&mut snapshot, &event)? == Applied::Changed
                && events.send(Ok(snapshot.clone())).is_err()
            {
                return Ok(());
            }
        }
    }

    Err(StoreError::Disconnected)
}
