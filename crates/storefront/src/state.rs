//! The storefront facade a host application holds on to.

use std::sync::Arc;

use secrecy::SecretString;
use shopez_core::{Email, ProductId, Uid};
use tracing::{info, instrument};

use crate::binding::CartBinding;
use crate::cache::{FileCache, LocalCache};
use crate::cart::{CartLine, CartReconciler};
use crate::catalog::{CatalogClient, Product, ProductBrowser};
use crate::config::ClientConfig;
use crate::error::{
    AppError, CartAction, Notice, Result, add_breadcrumb, clear_sentry_user, set_sentry_user,
};
use crate::identity::{
    AuthError, FirebaseAuth, IdentityProvider, Session, validate_registration,
};
use crate::session::SessionGate;
use crate::store::{FirebaseDatabase, RealtimeStore};

/// Catalog, identity, cart and session gate behind one handle.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    catalog: CatalogClient,
    identity: Arc<dyn IdentityProvider>,
    reconciler: CartReconciler,
    gate: SessionGate,
}

impl Storefront {
    /// Assemble a storefront from its collaborators.
    #[must_use]
    pub fn new(
        catalog: CatalogClient,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RealtimeStore>,
        cache: Arc<dyn LocalCache>,
    ) -> Self {
        let gate = SessionGate::new(identity.observe());
        Self {
            inner: Arc::new(StorefrontInner {
                catalog,
                identity,
                reconciler: CartReconciler::new(store, cache),
                gate,
            }),
        }
    }

    /// Connect to the configured Firebase project and catalog API, restoring
    /// any persisted session first.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted session cannot be read.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let cache: Arc<dyn LocalCache> = Arc::new(FileCache::new(&config.cache_dir));
        let auth = FirebaseAuth::new(&config.firebase, Arc::clone(&cache));
        if let Some(session) = auth.restore().await? {
            set_sentry_user(&session.uid, session.email.as_ref().map(Email::as_str));
        }

        let store = FirebaseDatabase::new(&config.firebase.database_url, Arc::new(auth.clone()));
        Ok(Self::new(
            CatalogClient::new(&config.catalog_url),
            Arc::new(auth),
            Arc::new(store),
            cache,
        ))
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogClient {
        &self.inner.catalog
    }

    #[must_use]
    pub fn reconciler(&self) -> &CartReconciler {
        &self.inner.reconciler
    }

    #[must_use]
    pub fn gate(&self) -> &SessionGate {
        &self.inner.gate
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.gate.current()
    }

    fn require_uid(&self) -> Result<Uid> {
        self.session()
            .map(|session| session.uid)
            .ok_or(AppError::NotSignedIn)
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` if the email is malformed or the provider
    /// rejects the credentials. The session stays absent.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let email = Email::parse(email).map_err(AuthError::from)?;
        let session = self
            .inner
            .identity
            .sign_in(&email, &SecretString::from(password))
            .await?;
        set_sentry_user(&session.uid, Some(email.as_str()));
        Ok(session)
    }

    /// Create an account from the registration form and sign it in.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` if the email is malformed, the password is too
    /// short or unconfirmed, or the provider refuses the account.
    #[instrument(skip(self, password, confirmation))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<Session> {
        let email = Email::parse(email).map_err(AuthError::from)?;
        let password = SecretString::from(password);
        validate_registration(&password, &SecretString::from(confirmation))?;

        let session = self.inner.identity.register(&email, &password).await?;
        set_sentry_user(&session.uid, Some(email.as_str()));
        Ok(session)
    }

    /// Sign out.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SignOut` if the provider fails.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        self.inner
            .identity
            .sign_out()
            .await
            .map_err(AppError::SignOut)?;
        clear_sentry_user();
        Ok(())
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Fill `browser` from the catalog.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Catalog` if the products cannot be fetched.
    pub async fn load_products(&self, browser: &mut ProductBrowser) -> Result<()> {
        browser.load(&self.inner.catalog).await?;
        info!(products = browser.products().len(), "Catalog loaded");
        Ok(())
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Keep a cart subscription bound to the signed-in user.
    #[must_use]
    pub fn bind_cart(&self) -> CartBinding {
        self.inner.gate.bind_cart(self.inner.reconciler.clone())
    }

    /// Add `product` to the signed-in user's cart with quantity 1.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotSignedIn` without a session, or `AppError::Cart`
    /// if the write fails.
    pub async fn add_to_cart(&self, product: &Product) -> Result<Notice> {
        let uid = self.require_uid()?;
        self.inner
            .reconciler
            .add_product(&uid, product)
            .await
            .map_err(|e| AppError::cart(CartAction::Add, e))?;

        let product_id = product.id.to_string();
        add_breadcrumb("cart", "Added product", Some(&[("product_id", product_id.as_str())]));
        Ok(Notice::added_to_cart())
    }

    /// Change the quantity of a line. Below 1 removes it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotSignedIn` without a session, or `AppError::Cart`
    /// if the write fails.
    pub async fn update_quantity(&self, line: &CartLine, quantity: i64) -> Result<()> {
        let uid = self.require_uid()?;
        self.inner
            .reconciler
            .update_quantity(&uid, line, quantity)
            .await
            .map_err(|e| AppError::cart(CartAction::UpdateQuantity, e))?;

        let product_id = line.product_id().to_string();
        let quantity = quantity.to_string();
        add_breadcrumb(
            "cart",
            "Updated quantity",
            Some(&[
                ("product_id", product_id.as_str()),
                ("quantity", quantity.as_str()),
            ]),
        );
        Ok(())
    }

    /// Remove a product from the cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotSignedIn` without a session, or `AppError::Cart`
    /// if the delete fails.
    pub async fn remove_from_cart(&self, product_id: ProductId) -> Result<()> {
        let uid = self.require_uid()?;
        self.inner
            .reconciler
            .remove_line(&uid, product_id)
            .await
            .map_err(|e| AppError::cart(CartAction::Remove, e))?;

        let product_id = product_id.to_string();
        add_breadcrumb("cart", "Removed product", Some(&[("product_id", product_id.as_str())]));
        Ok(())
    }

    /// Acknowledge "Proceed to Checkout". The cart is left as it is.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotSignedIn` without a session.
    pub fn checkout(&self) -> Result<Notice> {
        let uid = self.require_uid()?;
        info!(uid = %uid, "Checkout requested");
        add_breadcrumb("cart", "Checkout", None);
        Ok(Notice::checkout())
    }
}
