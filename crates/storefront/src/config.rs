//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `FIREBASE_API_KEY` - Web API key of the Firebase project
//! - `FIREBASE_DATABASE_URL` - Realtime Database URL (e.g., <https://my-app-default-rtdb.firebaseio.com>)
//!
//! ## Optional
//! - `SHOPEZ_CATALOG_URL` - Product catalog base URL (default: <https://fakestoreapi.com>)
//! - `SHOPEZ_CACHE_DIR` - Directory for the durable local cache (default: `.shopez-cache`)
//! - `FIREBASE_IDENTITY_URL` - Identity Toolkit base URL (default: Google's)
//! - `FIREBASE_TOKEN_URL` - Secure Token base URL (default: Google's)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

pub const DEFAULT_CATALOG_URL: &str = "https://fakestoreapi.com";
pub const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";
const DEFAULT_CACHE_DIR: &str = ".shopez-cache";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "your_",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Product catalog base URL
    pub catalog_url: Url,
    /// Directory holding the durable local cache
    pub cache_dir: PathBuf,
    /// Firebase project configuration
    pub firebase: FirebaseConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "production", "staging")
    pub sentry_environment: Option<String>,
}

/// Firebase project configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct FirebaseConfig {
    /// Web API key
    pub api_key: SecretString,
    /// Realtime Database URL
    pub database_url: Url,
    /// Identity Toolkit base URL (sign-in, sign-up)
    pub identity_url: Url,
    /// Secure Token base URL (token refresh)
    pub token_url: Url,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("api_key", &"[REDACTED]")
            .field("database_url", &self.database_url.as_str())
            .field("identity_url", &self.identity_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, a URL does not
    /// parse, or the API key looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let catalog_url = get_url_or_default("SHOPEZ_CATALOG_URL", DEFAULT_CATALOG_URL)?;
        let cache_dir = PathBuf::from(get_env_or_default("SHOPEZ_CACHE_DIR", DEFAULT_CACHE_DIR));
        let firebase = FirebaseConfig::from_env()?;

        Ok(Self {
            catalog_url,
            cache_dir,
            firebase,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

impl FirebaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: get_validated_secret("FIREBASE_API_KEY")?,
            database_url: parse_url("FIREBASE_DATABASE_URL", &get_required_env("FIREBASE_DATABASE_URL")?)?,
            identity_url: get_url_or_default("FIREBASE_IDENTITY_URL", DEFAULT_IDENTITY_URL)?,
            token_url: get_url_or_default("FIREBASE_TOKEN_URL", DEFAULT_TOKEN_URL)?,
        })
    }

    /// The API key, for query strings.
    #[must_use]
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_url_or_default(key: &str, default: &str) -> Result<Url, ConfigError> {
    parse_url(key, &get_env_or_default(key, default))
}

/// Parse a base URL, requiring an http(s) scheme.
fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim_end_matches('/'))
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Validate that a secret is not a placeholder.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    if secret.trim().is_empty() {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            "is empty".to_string(),
        ));
    }

    let lower = secret.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
