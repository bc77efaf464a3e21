//! Identity provider: sign-in, registration and the current session.
//!
//! The provider owns the session. Everything downstream (screen gating, the
//! cart binding) follows it through [`IdentityProvider::observe`], a `watch`
//! channel holding the latest `Option<Session>`.
//!
//! - [`FirebaseAuth`] - Firebase Auth REST endpoints, with the refresh token
//!   persisted in the local cache
//! - [`MemoryIdentity`] - in-process accounts, for offline use and tests

mod firebase;
mod memory;

pub use firebase::FirebaseAuth;
pub use memory::MemoryIdentity;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use shopez_core::{Email, Uid};
use thiserror::Error;
use tokio::sync::watch;

use crate::cache::CacheError;

/// Minimum password length accepted by the hosted provider.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// The signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
}

impl Session {
    #[must_use]
    pub const fn new(uid: Uid, email: Option<Email>) -> Self {
        Self { uid, email }
    }
}

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] shopez_core::EmailError),

    /// The provider rejected the email address.
    #[error("email address rejected by provider")]
    EmailRejected,

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Provider is throttling sign-in attempts.
    #[error("too many attempts, try again later")]
    TooManyAttempts,

    /// The stored session can no longer be refreshed.
    #[error("session expired")]
    SessionExpired,

    /// No user is signed in.
    #[error("not signed in")]
    NotSignedIn,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Any other provider failure.
    #[error("identity provider error: {0}")]
    Provider(String),

    /// Persisting the session failed.
    #[error("session cache error: {0}")]
    Cache(#[from] CacheError),
}

impl AuthError {
    /// Map a Firebase Auth error code (`error.message`) to an error.
    ///
    /// Codes may carry a detail suffix, e.g.
    /// `WEAK_PASSWORD : Password should be at least 6 characters`.
    #[must_use]
    pub fn from_provider_code(message: &str) -> Self {
        let (code, detail) = message
            .split_once(" : ")
            .map_or((message.trim(), None), |(c, d)| (c.trim(), Some(d.trim())));

        match code {
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS"
            | "USER_DISABLED" => Self::InvalidCredentials,
            "EMAIL_EXISTS" => Self::UserAlreadyExists,
            "WEAK_PASSWORD" => Self::WeakPassword(
                detail
                    .unwrap_or("password is too weak")
                    .to_string(),
            ),
            "INVALID_EMAIL" | "MISSING_EMAIL" => Self::EmailRejected,
            "TOO_MANY_ATTEMPTS_TRY_LATER" => Self::TooManyAttempts,
            "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND" => Self::SessionExpired,
            _ => Self::Provider(message.to_string()),
        }
    }
}

/// Check a registration form: minimum length and matching confirmation.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` when the password is too short or the
/// confirmation differs.
pub fn validate_registration(
    password: &SecretString,
    confirmation: &SecretString,
) -> Result<(), AuthError> {
    validate_password(password)?;
    if password.expose_secret() != confirmation.expose_secret() {
        return Err(AuthError::WeakPassword("passwords do not match".to_string()));
    }
    Ok(())
}

/// Check a password against the provider minimum.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` if it is shorter than
/// [`MIN_PASSWORD_LENGTH`] characters.
pub fn validate_password(password: &SecretString) -> Result<(), AuthError> {
    if password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// A hosted identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sign in with email and password. On success the session is published
    /// to observers before this returns.
    async fn sign_in(&self, email: &Email, password: &SecretString) -> Result<Session, AuthError>;

    /// Create an account and sign it in.
    async fn register(&self, email: &Email, password: &SecretString)
    -> Result<Session, AuthError>;

    /// Sign out. Observers see `None` before this returns.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// The current session and every later transition.
    fn observe(&self) -> watch::Receiver<Option<Session>>;
}

/// Supplies the ID token that authorizes realtime store requests.
#[async_trait]
pub trait IdTokenSource: Send + Sync {
    /// A valid ID token for the signed-in user, or `None` when signed out.
    async fn id_token(&self) -> Result<Option<SecretString>, AuthError>;
}
