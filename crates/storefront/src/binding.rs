//! Keeps one cart subscription alive for whoever is signed in.
//!
//! A background task follows the session stream. When the identity changes
//! it detaches the old cart subscription, publishes an empty cart (so the
//! badge drops to zero), and subscribes for the new identity, if any. Cart
//! snapshots from the live subscription are published as they arrive.

use shopez_core::Uid;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cart::{Cart, CartReconciler, CartSubscription, badge_label};
use crate::identity::Session;

/// The cart visible to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    /// Whose cart this is; `None` when signed out.
    pub uid: Option<Uid>,
    pub cart: Cart,
}

impl CartState {
    #[must_use]
    pub fn item_count(&self) -> i64 {
        self.cart.item_count()
    }

    #[must_use]
    pub fn badge_label(&self) -> String {
        badge_label(self.item_count())
    }
}

/// Handle to the background task binding the cart to the session.
///
/// Dropping the handle stops the task and detaches its subscription.
#[derive(Debug)]
pub struct CartBinding {
    state: watch::Receiver<CartState>,
    task: JoinHandle<()>,
}

impl CartBinding {
    /// Start following `sessions`. The first session value is processed
    /// right away if the receiver has it marked as changed.
    #[must_use]
    pub fn spawn(
        sessions: watch::Receiver<Option<Session>>,
        reconciler: CartReconciler,
    ) -> Self {
        let (tx, state) = watch::channel(CartState::default());
        let task = tokio::spawn(run(sessions, reconciler, tx));
        Self { state, task }
    }

    /// Receiver of every published cart state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<CartState> {
        self.state.clone()
    }

    #[must_use]
    pub fn current(&self) -> CartState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn item_count(&self) -> i64 {
        self.state.borrow().item_count()
    }

    /// Stop the task. The cart stops updating.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for CartBinding {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    mut sessions: watch::Receiver<Option<Session>>,
    reconciler: CartReconciler,
    state: watch::Sender<CartState>,
) {
    let mut subscription: Option<CartSubscription> = None;

    loop {
        tokio::select! {
            changed = sessions.changed() => {
                if changed.is_err() {
                    debug!("Session stream closed, stopping cart binding");
                    break;
                }
                let uid = sessions.borrow_and_update().as_ref().map(|s| s.uid.clone());
                if uid == subscription.as_ref().map(|s| s.uid().clone()) {
                    continue;
                }

                if let Some(mut old) = subscription.take() {
                    old.unsubscribe();
                }
                state.send_replace(CartState { uid: uid.clone(), cart: Cart::empty() });

                match uid {
                    Some(uid) => {
                        info!(uid = %uid, "Binding cart to session");
                        subscription = Some(reconciler.observe(&uid));
                    }
                    None => info!("Session ended, cart cleared"),
                }
            }
            Some(cart) = next_cart(subscription.as_mut()) => {
                let uid = subscription.as_ref().map(|s| s.uid().clone());
                state.send_replace(CartState { uid, cart });
            }
        }
    }
}

async fn next_cart(subscription: Option<&mut CartSubscription>) -> Option<Cart> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use shopez_core::{Price, ProductId};

    use super::*;
    use crate::cache::MemoryCache;
    use crate::catalog::Product;
    use crate::store::{MemoryStore, StorePath};

    fn product(id: i64) -> Product {
        Product {
            id: ProductId::new(id),
            title: format!("Product {id}"),
            price: Price::from_cents(1000),
            category: "jewelery".to_string(),
            description: String::new(),
            image: String::new(),
            rating: None,
        }
    }

    fn session(uid: &str) -> Option<Session> {
        Some(Session::new(Uid::new(uid), None))
    }

    #[tokio::test]
    async fn test_cart_follows_sign_in_and_out() {
        let store = MemoryStore::new();
        let reconciler = CartReconciler::new(Arc::new(store.clone()), Arc::new(MemoryCache::new()));
        let u1 = Uid::new("u1");
        reconciler.add_product(&u1, &product(1)).await.unwrap();

        let (sessions, mut rx) = watch::channel(session("u1"));
        rx.mark_changed();
        let binding = CartBinding::spawn(rx, reconciler.clone());
        let mut state = binding.state();

        state
            .wait_for(|s| s.uid.as_ref() == Some(&u1) && s.item_count() == 1)
            .await
            .unwrap();
        assert_eq!(store.listener_count(), 1);

        sessions.send_replace(None);
        state.wait_for(|s| s.uid.is_none()).await.unwrap();
        assert_eq!(binding.item_count(), 0);
        assert_eq!(store.listener_count(), 0);
        assert_eq!(store.emit(&StorePath::cart(&u1)), 0);

        reconciler.add_product(&u1, &product(2)).await.unwrap();
        assert_eq!(binding.item_count(), 0);
    }

    #[tokio::test]
    async fn test_identity_switch_resubscribes() {
        let store = MemoryStore::new();
        let reconciler = CartReconciler::new(Arc::new(store.clone()), Arc::new(MemoryCache::new()));
        let u2 = Uid::new("u2");
        reconciler.add_product(&u2, &product(5)).await.unwrap();

        let (sessions, mut rx) = watch::channel(session("u1"));
        rx.mark_changed();
        let binding = CartBinding::spawn(rx, reconciler);
        let mut state = binding.state();
        state
            .wait_for(|s| s.uid == Some(Uid::new("u1")))
            .await
            .unwrap();

        sessions.send_replace(session("u2"));
        let current = state
            .wait_for(|s| s.uid.as_ref() == Some(&u2) && !s.cart.is_empty())
            .await
            .unwrap()
            .clone();
        assert!(current.cart.contains(ProductId::new(5)));
        assert_eq!(store.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_same_uid_keeps_subscription() {
        let store = MemoryStore::new();
        let reconciler = CartReconciler::new(Arc::new(store.clone()), Arc::new(MemoryCache::new()));

        let (sessions, mut rx) = watch::channel(session("u1"));
        rx.mark_changed();
        let binding = CartBinding::spawn(rx, reconciler.clone());
        let mut state = binding.state();
        state.wait_for(|s| s.uid.is_some()).await.unwrap();

        // A refreshed token for the same user.
        sessions.send_replace(session("u1"));
        reconciler.add_product(&Uid::new("u1"), &product(3)).await.unwrap();
        state.wait_for(|s| s.item_count() == 1).await.unwrap();
        assert_eq!(store.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_detaches() {
        let store = MemoryStore::new();
        let reconciler = CartReconciler::new(Arc::new(store.clone()), Arc::new(MemoryCache::new()));
        let (_sessions, mut rx) = watch::channel(session("u1"));
        rx.mark_changed();

        let binding = CartBinding::spawn(rx, reconciler);
        binding.state().wait_for(|s| s.uid.is_some()).await.unwrap();
        drop(binding);

        for _ in 0..100 {
            if store.listener_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.listener_count(), 0);
    }
}
