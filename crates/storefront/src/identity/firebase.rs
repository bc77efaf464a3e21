//! Firebase Auth over REST.
//!
//! - `POST {identity}/accounts:signInWithPassword?key=` and
//!   `accounts:signUp` exchange email and password for an ID token and a
//!   refresh token
//! - `POST {token}/token?key=` (form encoded) trades the refresh token for a
//!   fresh ID token
//!
//! The refresh token is persisted under [`AUTH_SESSION_KEY`] so
//! [`FirebaseAuth::restore`] can bring a session back after a restart.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shopez_core::{Email, Uid};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use super::{AuthError, IdTokenSource, IdentityProvider, Session};
use crate::cache::{AUTH_SESSION_KEY, LocalCache};
use crate::config::FirebaseConfig;

/// Refresh the ID token when it has less than this left.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the provider omits or garbles `expiresIn`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Firebase Auth client. Cloning shares the session.
#[derive(Clone)]
pub struct FirebaseAuth {
    inner: Arc<FirebaseAuthInner>,
}

struct FirebaseAuthInner {
    client: reqwest::Client,
    api_key: SecretString,
    identity_url: String,
    token_url: String,
    cache: Arc<dyn LocalCache>,
    tokens: Mutex<Option<Tokens>>,
    sessions: watch::Sender<Option<Session>>,
}

struct Tokens {
    id_token: SecretString,
    refresh_token: SecretString,
    expires_at: DateTime<Utc>,
}

impl Tokens {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now
    }
}

/// What survives a restart.
#[derive(Serialize, Deserialize)]
struct PersistedSession {
    uid: Uid,
    #[serde(default)]
    email: Option<Email>,
    refresh_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

/// The token endpoint answers in snake case.
#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn expiry(expires_in: Option<&str>) -> DateTime<Utc> {
    let secs = expires_in
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    Utc::now() + Duration::seconds(secs)
}

impl FirebaseAuth {
    /// Create a client with no session. Call [`restore`](Self::restore) to
    /// pick up a persisted one.
    #[must_use]
    pub fn new(config: &FirebaseConfig, cache: Arc<dyn LocalCache>) -> Self {
        Self::with_client(reqwest::Client::new(), config, cache)
    }

    /// Create a client with a custom `reqwest::Client`.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        config: &FirebaseConfig,
        cache: Arc<dyn LocalCache>,
    ) -> Self {
        let (sessions, _) = watch::channel(None);
        Self {
            inner: Arc::new(FirebaseAuthInner {
                client,
                api_key: config.api_key.clone(),
                identity_url: config.identity_url.as_str().trim_end_matches('/').to_string(),
                token_url: config.token_url.as_str().trim_end_matches('/').to_string(),
                cache,
                tokens: Mutex::new(None),
                sessions,
            }),
        }
    }

    /// Current session, if any.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.sessions.borrow().clone()
    }

    /// Bring back the session persisted by an earlier run.
    ///
    /// The refresh token is exchanged right away. If the provider says it is
    /// no longer valid the persisted session is discarded; if the provider
    /// cannot be reached the session is restored as-is and the exchange is
    /// retried on the next token request.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<Option<Session>, AuthError> {
        let Some(json) = self.inner.cache.get(AUTH_SESSION_KEY).await? else {
            return Ok(None);
        };
        let persisted: PersistedSession = match serde_json::from_str(&json) {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable persisted session");
                self.inner.cache.remove(AUTH_SESSION_KEY).await?;
                return Ok(None);
            }
        };

        let session = Session::new(persisted.uid, persisted.email);
        *self.inner.tokens.lock().await = Some(Tokens {
            id_token: SecretString::from(String::new()),
            refresh_token: SecretString::from(persisted.refresh_token),
            expires_at: DateTime::<Utc>::UNIX_EPOCH,
        });
        self.publish(Some(session.clone()));

        match self.refresh().await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(AuthError::SessionExpired | AuthError::InvalidCredentials) => {
                info!(uid = %session.uid, "Persisted session expired");
                self.clear().await?;
                Ok(None)
            }
            Err(e) => {
                warn!(uid = %session.uid, error = %e, "Could not refresh persisted session, keeping it");
                Ok(Some(session))
            }
        }
    }

    /// Exchange the refresh token for a new ID token. Publishes a transition
    /// if the provider reports a different user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotSignedIn` without a session, or the provider's
    /// error.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Session, AuthError> {
        let refresh_token = {
            let tokens = self.inner.tokens.lock().await;
            let tokens = tokens.as_ref().ok_or(AuthError::NotSignedIn)?;
            tokens.refresh_token.expose_secret().to_string()
        };

        let url = format!(
            "{}/token?key={}",
            self.inner.token_url,
            urlencoding::encode(self.inner.api_key.expose_secret())
        );
        let response = self
            .inner
            .client
            .post(url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;
        let refreshed: RefreshResponse = read_response(response).await?;

        let uid = Uid::new(refreshed.user_id);
        let email = self
            .session()
            .filter(|current| current.uid == uid)
            .and_then(|current| current.email);
        let session = Session::new(uid, email);

        self.establish(
            &session,
            Tokens {
                id_token: SecretString::from(refreshed.id_token),
                refresh_token: SecretString::from(refreshed.refresh_token),
                expires_at: expiry(refreshed.expires_in.as_deref()),
            },
        )
        .await;
        debug!(uid = %session.uid, "ID token refreshed");
        Ok(session)
    }

    async fn password_flow(
        &self,
        endpoint: &str,
        email: &Email,
        password: &SecretString,
    ) -> Result<Session, AuthError> {
        let url = format!(
            "{}/accounts:{endpoint}?key={}",
            self.inner.identity_url,
            urlencoding::encode(self.inner.api_key.expose_secret())
        );
        let response = self
            .inner
            .client
            .post(url)
            .json(&PasswordRequest {
                email: email.as_str(),
                password: password.expose_secret(),
                return_secure_token: true,
            })
            .send()
            .await?;
        let body: PasswordResponse = read_response(response).await?;

        let email = body
            .email
            .as_deref()
            .and_then(|e| Email::parse(e).ok())
            .or_else(|| Some(email.clone()));
        let session = Session::new(Uid::new(body.local_id), email);

        self.establish(
            &session,
            Tokens {
                id_token: SecretString::from(body.id_token),
                refresh_token: SecretString::from(body.refresh_token),
                expires_at: expiry(body.expires_in.as_deref()),
            },
        )
        .await;
        Ok(session)
    }

    /// Store tokens, persist the session and publish it.
    async fn establish(&self, session: &Session, tokens: Tokens) {
        let persisted = PersistedSession {
            uid: session.uid.clone(),
            email: session.email.clone(),
            refresh_token: tokens.refresh_token.expose_secret().to_string(),
        };
        *self.inner.tokens.lock().await = Some(tokens);

        match serde_json::to_string(&persisted) {
            Ok(json) => {
                if let Err(e) = self.inner.cache.set(AUTH_SESSION_KEY, json).await {
                    warn!(error = %e, "Failed to persist session");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize session"),
        }

        self.publish(Some(session.clone()));
    }

    /// Forget tokens and the persisted session, then publish `None`.
    async fn clear(&self) -> Result<(), AuthError> {
        self.inner.cache.remove(AUTH_SESSION_KEY).await?;
        *self.inner.tokens.lock().await = None;
        self.publish(None);
        Ok(())
    }

    fn publish(&self, session: Option<Session>) {
        self.inner.sessions.send_if_modified(|current| {
            if *current == session {
                false
            } else {
                *current = session;
                true
            }
        });
    }
}

/// Decode a provider response, mapping its error envelope.
async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AuthError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let code = serde_json::from_str::<ErrorEnvelope>(&body)
            .map_or_else(|_| format!("HTTP {status}"), |e| e.error.message);
        debug!(status = %status, code = %code, "Identity provider rejected request");
        return Err(AuthError::from_provider_code(&code));
    }

    serde_json::from_str(&body)
        .map_err(|e| AuthError::Provider(format!("unexpected response: {e}")))
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in(&self, email: &Email, password: &SecretString) -> Result<Session, AuthError> {
        let session = self.password_flow("signInWithPassword", email, password).await?;
        info!(uid = %session.uid, "Signed in");
        Ok(session)
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn register(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Session, AuthError> {
        super::validate_password(password)?;
        let session = self.password_flow("signUp", email, password).await?;
        info!(uid = %session.uid, "Registered");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), AuthError> {
        self.clear().await?;
        info!("Signed out");
        Ok(())
    }

    fn observe(&self) -> watch::Receiver<Option<Session>> {
        self.inner.sessions.subscribe()
    }
}

#[async_trait]
impl IdTokenSource for FirebaseAuth {
    async fn id_token(&self) -> Result<Option<SecretString>, AuthError> {
        {
            let tokens = self.inner.tokens.lock().await;
            match tokens.as_ref() {
                None => return Ok(None),
                Some(tokens) if tokens.is_fresh(Utc::now()) => {
                    return Ok(Some(tokens.id_token.clone()));
                }
                Some(_) => {}
            }
        }

        self.refresh().await?;
        let tokens = self.inner.tokens.lock().await;
        Ok(tokens.as_ref().map(|t| t.id_token.clone()))
    }
}
