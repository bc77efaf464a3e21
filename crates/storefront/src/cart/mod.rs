//! Per-user cart mirrored between the realtime store and the local cache.
//!
//! # Architecture
//!
//! - The remote record at `carts/{uid}` is authoritative; every remote event
//!   replaces the whole local snapshot
//! - Each good snapshot is mirrored into the durable cache under `cart_{uid}`
//! - A failed or undecodable read is answered from that cache (or an empty
//!   cart) instead of ending the subscription
//! - Writes go to the store only; the visible cart changes when the store
//!   echoes them back
//!
//! # Example
//!
//! ```rust,ignore
//! let reconciler = CartReconciler::new(store, cache);
//! let mut cart = reconciler.observe(&uid);
//! reconciler.add_product(&uid, &product).await?;
//! while let Some(snapshot) = cart.next().await {
//!     println!("{} items, {}", snapshot.item_count(), snapshot.total_label());
//! }
//! ```

pub mod types;

pub use types::{Cart, CartDecodeError, CartLine, MAX_LINE_QUANTITY, badge_label};

use std::sync::Arc;

use futures::Stream;
use shopez_core::{ProductId, Uid};
use tracing::{debug, instrument, warn};

use crate::cache::{LocalCache, cart_key};
use crate::catalog::Product;
use crate::store::{Listener, RealtimeStore, StoreError, StorePath};

/// Reads and writes user carts. Cloning shares the backends.
#[derive(Clone)]
pub struct CartReconciler {
    store: Arc<dyn RealtimeStore>,
    cache: Arc<dyn LocalCache>,
}

impl CartReconciler {
    #[must_use]
    pub fn new(store: Arc<dyn RealtimeStore>, cache: Arc<dyn LocalCache>) -> Self {
        Self { store, cache }
    }

    /// Subscribe to a user's cart.
    #[must_use]
    pub fn observe(&self, uid: &Uid) -> CartSubscription {
        debug!(uid = %uid, "Observing cart");
        CartSubscription {
            uid: uid.clone(),
            listener: self.store.subscribe(&StorePath::cart(uid)),
            cache: Arc::clone(&self.cache),
        }
    }

    /// Write a complete line. A quantity below 1 removes the line instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    #[instrument(skip(self, line), fields(uid = %uid, product_id = %product_id, quantity = line.quantity))]
    pub async fn set_line(
        &self,
        uid: &Uid,
        product_id: ProductId,
        line: CartLine,
    ) -> Result<(), StoreError> {
        if line.quantity < 1 {
            return self.remove_line(uid, product_id).await;
        }
        let value = serde_json::to_value(&line)?;
        self.store
            .set(&StorePath::cart_line(uid, product_id), value)
            .await
    }

    /// Delete a line. Deleting an absent line succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    #[instrument(skip(self), fields(uid = %uid, product_id = %product_id))]
    pub async fn remove_line(&self, uid: &Uid, product_id: ProductId) -> Result<(), StoreError> {
        self.store
            .remove(&StorePath::cart_line(uid, product_id))
            .await
    }

    /// Put `product` in the cart with quantity 1, replacing any existing line.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn add_product(&self, uid: &Uid, product: &Product) -> Result<(), StoreError> {
        self.set_line(uid, product.id, CartLine::new(product.clone()))
            .await
    }

    /// Rewrite `line` with a new quantity; below 1 removes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn update_quantity(
        &self,
        uid: &Uid,
        line: &CartLine,
        quantity: i64,
    ) -> Result<(), StoreError> {
        self.set_line(uid, line.product_id(), line.with_quantity(quantity))
            .await
    }
}

/// A live view of one user's cart.
///
/// Snapshots are pulled with [`next`](Self::next), so reconciliation and the
/// cache mirror run on the caller's task. Dropping the subscription detaches
/// it from the store.
pub struct CartSubscription {
    uid: Uid,
    listener: Listener,
    cache: Arc<dyn LocalCache>,
}

impl CartSubscription {
    #[must_use]
    pub const fn uid(&self) -> &Uid {
        &self.uid
    }

    /// Wait for the next snapshot. Returns `None` after
    /// [`unsubscribe`](Self::unsubscribe) or when the store has gone away.
    pub async fn next(&mut self) -> Option<Cart> {
        let event = self.listener.recv().await?;
        let remote = match event {
            Ok(value) => Cart::decode(&value).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let cart = match remote {
            Ok(cart) => {
                mirror(&self.uid, self.cache.as_ref(), &cart).await;
                cart
            }
            Err(reason) => {
                warn!(uid = %self.uid, reason = %reason, "Cart read failed, using cached cart");
                recover(&self.uid, self.cache.as_ref()).await
            }
        };
        Some(cart)
    }

    /// Detach from the store. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        self.listener.detach();
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.listener.is_attached()
    }

    /// Turn the subscription into a stream of snapshots.
    pub fn into_stream(self) -> impl Stream<Item = Cart> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            let cart = subscription.next().await?;
            Some((cart, subscription))
        })
    }
}

async fn mirror(uid: &Uid, cache: &dyn LocalCache, cart: &Cart) {
    let json = match cart.to_cache_json() {
        Ok(json) => json,
        Err(e) => {
            warn!(uid = %uid, error = %e, "Failed to serialize cart for cache");
            return;
        }
    };
    if let Err(e) = cache.set(&cart_key(uid), json).await {
        warn!(uid = %uid, error = %e, "Failed to cache cart");
    }
}

async fn recover(uid: &Uid, cache: &dyn LocalCache) -> Cart {
    match cache.get(&cart_key(uid)).await {
        Ok(Some(json)) => Cart::from_cache_json(&json).unwrap_or_else(|e| {
            warn!(uid = %uid, error = %e, "Cached cart is unreadable");
            Cart::empty()
        }),
        Ok(None) => Cart::empty(),
        Err(e) => {
            warn!(uid = %uid, error = %e, "Failed to read cached cart");
            Cart::empty()
        }
    }
}

impl std::fmt::Debug for CartSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSubscription")
            .field("uid", &self.uid)
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}
