//! Who is signed in.

use parley_shared::UserId;
use tokio::sync::watch;
use tracing::info;

/// Source of the current user. Sign-in flows live outside the client; the
/// client only reads the current identity and follows its changes.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;

    /// Receiver that yields the new user (or `None` on sign-out) after
    /// every change.
    fn on_auth_change(&self) -> watch::Receiver<Option<UserId>>;
}

/// In-process auth state, used by the demo binary and tests.
pub struct LocalAuth {
    tx: watch::Sender<Option<UserId>>,
}

impl LocalAuth {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn sign_in(&self, user: UserId) {
        info!(user = %user, "Signed in");
        self.tx.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        if let Some(user) = self.tx.send_replace(None) {
            info!(user = %user, "Signed out");
        }
    }
}

impl Default for LocalAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthProvider for LocalAuth {
    fn current_user(&self) -> Option<UserId> {
        self.tx.borrow().clone()
    }

    fn on_auth_change(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }
}
