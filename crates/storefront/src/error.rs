//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type for the facade operations. Each error
//! maps to the [`Notice`] the presentation layer shows; internal failures are
//! captured to Sentry first by [`AppError::report`].

use thiserror::Error;

use crate::cache::CacheError;
use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::identity::AuthError;
use crate::store::StoreError;

/// A cart action, for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartAction {
    Add,
    UpdateQuantity,
    Remove,
}

impl CartAction {
    const fn failure_message(self) -> &'static str {
        match self {
            Self::Add => "Failed to add product to cart",
            Self::UpdateQuantity => "Failed to update quantity",
            Self::Remove => "Failed to remove item from cart",
        }
    }
}

/// Application-level error type for the storefront client.
#[derive(Debug, Error)]
pub enum AppError {
    /// Catalog fetch failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Configuration is missing or invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Local cache operation failed.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Remote cart write failed.
    #[error("Cart {action:?} failed: {source}")]
    Cart {
        action: CartAction,
        #[source]
        source: StoreError,
    },

    /// A cart action needs a signed-in user.
    #[error("Not signed in")]
    NotSignedIn,

    /// Sign-out failed.
    #[error("Sign out failed: {0}")]
    SignOut(#[source] AuthError),
}

impl AppError {
    #[must_use]
    pub const fn cart(action: CartAction, source: StoreError) -> Self {
        Self::Cart { action, source }
    }

    /// Whether this is a failure of ours or a collaborator's, rather than a
    /// user mistake.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Catalog(_) | Self::Cart { .. } | Self::Cache(_) | Self::Config(_) | Self::SignOut(_)
        )
    }

    /// Capture internal errors to Sentry and log them. Returns `self` so it
    /// can be chained before [`notice`](Self::notice).
    #[must_use]
    pub fn report(self) -> Self {
        if self.is_internal() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront error"
            );
        } else {
            tracing::debug!(error = %self, "User-facing error");
        }
        self
    }

    /// The alert to show for this error.
    #[must_use]
    pub fn notice(&self) -> Notice {
        let message = match self {
            Self::Catalog(_) => "Failed to fetch products".to_string(),
            Self::Cart { action, .. } => action.failure_message().to_string(),
            Self::NotSignedIn => "You must be logged in to add items to cart".to_string(),
            Self::SignOut(_) => "Failed to sign out".to_string(),
            Self::Cache(_) | Self::Config(_) => "Something went wrong".to_string(),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid credentials".to_string(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) => msg.clone(),
                AuthError::InvalidEmail(_) | AuthError::EmailRejected => {
                    "Invalid email address".to_string()
                }
                AuthError::TooManyAttempts => {
                    "Too many attempts, please try again later".to_string()
                }
                AuthError::SessionExpired | AuthError::NotSignedIn => {
                    "Session expired, please sign in again".to_string()
                }
                AuthError::Http(_) => "Unable to reach the sign-in service".to_string(),
                AuthError::Provider(_) | AuthError::Cache(_) => "Authentication error".to_string(),
            },
        };
        Notice::error(message)
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// A title and message for an alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            title: "Success".to_string(),
            message: message.into(),
        }
    }

    /// Shown after a product is added from the detail screen.
    #[must_use]
    pub fn added_to_cart() -> Self {
        Self::success("Product added to cart!")
    }

    /// Shown for "Proceed to Checkout". No order is placed.
    #[must_use]
    pub fn checkout() -> Self {
        Self {
            title: "Checkout".to_string(),
            message: "Thanks for checking out sir or mam".to_string(),
        }
    }
}

/// Set the Sentry user context.
///
/// Call this after sign-in to associate errors with users.
pub fn set_sentry_user(uid: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(uid.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added product", Some(&[("product_id", "3")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
