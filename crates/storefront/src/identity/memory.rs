//! In-process identity provider.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use shopez_core::{Email, Uid};
use tokio::sync::watch;
use tracing::info;

use super::{AuthError, IdTokenSource, IdentityProvider, Session, validate_password};

/// Accounts held in memory, keyed by lower-cased email.
///
/// Passwords are stored as Argon2id hashes. [`set_session`](Self::set_session)
/// switches the identity directly, the way a token refresh can.
#[derive(Clone)]
pub struct MemoryIdentity {
    inner: Arc<Inner>,
}

struct Inner {
    accounts: Mutex<HashMap<String, Account>>,
    sessions: watch::Sender<Option<Session>>,
}

struct Account {
    uid: Uid,
    email: Email,
    password_hash: String,
}

impl MemoryIdentity {
    #[must_use]
    pub fn new() -> Self {
        let (sessions, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                accounts: Mutex::new(HashMap::new()),
                sessions,
            }),
        }
    }

    /// Current session, if any.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.sessions.borrow().clone()
    }

    /// Replace the current session without going through sign-in.
    pub fn set_session(&self, session: Option<Session>) {
        self.inner.sessions.send_replace(session);
    }

    fn accounts(&self) -> MutexGuard<'_, HashMap<String, Account>> {
        self.inner
            .accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn establish(&self, account: &Account) -> Session {
        let session = Session::new(account.uid.clone(), Some(account.email.clone()));
        self.inner.sessions.send_replace(Some(session.clone()));
        session
    }
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

fn account_key(email: &Email) -> String {
    email.as_str().to_lowercase()
}

/// Hash a password using Argon2id.
fn hash_password(password: &SecretString) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Provider(format!("password hashing failed: {e}")))
}

/// Verify a password against a hash.
fn verify_password(password: &SecretString, hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn sign_in(&self, email: &Email, password: &SecretString) -> Result<Session, AuthError> {
        let accounts = self.accounts();
        let account = accounts
            .get(&account_key(email))
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, &account.password_hash)?;
        let session = self.establish(account);
        drop(accounts);

        info!(uid = %session.uid, "Signed in");
        Ok(session)
    }

    async fn register(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Session, AuthError> {
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let mut accounts = self.accounts();
        let key = account_key(email);
        if accounts.contains_key(&key) {
            return Err(AuthError::UserAlreadyExists);
        }
        let account = Account {
            uid: Uid::new(uuid::Uuid::new_v4().simple().to_string()),
            email: email.clone(),
            password_hash,
        };
        let session = self.establish(&account);
        accounts.insert(key, account);
        drop(accounts);

        info!(uid = %session.uid, "Registered");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.inner.sessions.send_replace(None);
        Ok(())
    }

    fn observe(&self) -> watch::Receiver<Option<Session>> {
        self.inner.sessions.subscribe()
    }
}

#[async_trait]
impl IdTokenSource for MemoryIdentity {
    async fn id_token(&self) -> Result<Option<SecretString>, AuthError> {
        Ok(self
            .session()
            .map(|session| SecretString::from(format!("memory:{}", session.uid))))
    }
}
