//! Session gate: which screens are reachable for the current identity.

use tokio::sync::watch;

use crate::binding::CartBinding;
use crate::cart::CartReconciler;
use crate::identity::Session;

/// Screens of the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Login,
    Register,
    ProductList,
    ProductDetail,
    Cart,
}

/// The group of screens reachable in one session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScreenSet {
    /// Signed out: login and registration.
    Auth,
    /// Signed in: browsing and the cart.
    Shop,
}

impl ScreenSet {
    #[must_use]
    pub const fn for_session(session: Option<&Session>) -> Self {
        if session.is_some() { Self::Shop } else { Self::Auth }
    }

    #[must_use]
    pub const fn screens(self) -> &'static [Screen] {
        match self {
            Self::Auth => &[Screen::Login, Screen::Register],
            Self::Shop => &[Screen::ProductList, Screen::ProductDetail, Screen::Cart],
        }
    }

    /// The screen shown on entering this set.
    #[must_use]
    pub const fn initial(self) -> Screen {
        match self {
            Self::Auth => Screen::Login,
            Self::Shop => Screen::ProductList,
        }
    }

    #[must_use]
    pub fn allows(self, screen: Screen) -> bool {
        self.screens().contains(&screen)
    }
}

/// Follows the identity provider's session stream.
#[derive(Debug, Clone)]
pub struct SessionGate {
    sessions: watch::Receiver<Option<Session>>,
}

impl SessionGate {
    #[must_use]
    pub const fn new(sessions: watch::Receiver<Option<Session>>) -> Self {
        Self { sessions }
    }

    /// A fresh receiver of session transitions, starting at the current one.
    #[must_use]
    pub fn observe(&self) -> watch::Receiver<Option<Session>> {
        let mut sessions = self.sessions.clone();
        sessions.mark_changed();
        sessions
    }

    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.sessions.borrow().clone()
    }

    #[must_use]
    pub fn screen_set(&self) -> ScreenSet {
        ScreenSet::for_session(self.sessions.borrow().as_ref())
    }

    /// Keep a cart subscription bound to whoever is signed in.
    #[must_use]
    pub fn bind_cart(&self, reconciler: CartReconciler) -> CartBinding {
        CartBinding::spawn(self.observe(), reconciler)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shopez_core::Uid;

    use super::*;

    #[test]
    fn test_screen_sets_partition_screens() {
        assert!(ScreenSet::Auth.allows(Screen::Login));
        assert!(!ScreenSet::Auth.allows(Screen::Cart));
        assert!(ScreenSet::Shop.allows(Screen::ProductDetail));
        assert!(!ScreenSet::Shop.allows(Screen::Register));
        assert_eq!(ScreenSet::Shop.initial(), Screen::ProductList);
    }

    #[tokio::test]
    async fn test_gate_follows_transitions() {
        let (tx, rx) = watch::channel(None);
        let gate = SessionGate::new(rx);
        assert_eq!(gate.screen_set(), ScreenSet::Auth);

        let mut observed = gate.observe();
        observed.changed().await.unwrap();
        assert!(observed.borrow_and_update().is_none());

        tx.send_replace(Some(Session::new(Uid::new("u1"), None)));
        observed.changed().await.unwrap();
        assert_eq!(gate.screen_set(), ScreenSet::Shop);
        assert_eq!(gate.current().unwrap().uid, Uid::new("u1"));

        tx.send_replace(None);
        observed.changed().await.unwrap();
        assert_eq!(gate.screen_set(), ScreenSet::Auth);
    }
}
