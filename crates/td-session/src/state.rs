//! Session state shared between callers and the receive loop.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

use crate::auth::LoginDetails;

/// Signals through which callers hand intent to the receive loop.
///
/// Callers only flip these; the loop is the one that acts on them.
/// Valid combinations:
/// - `initialized == false`: no engine handle exists, the loop is not running.
/// - `initialized && !destroyed`: the loop is running (possibly paused).
/// - `destroyed`: terminal; the handle is gone and the loop exits at its next
///   suspension point. `destroyed` may be set without `initialized`.
#[derive(Debug)]
pub struct SessionSignals {
    initialized: AtomicBool,
    paused: watch::Sender<bool>,
    destroyed: watch::Sender<bool>,
    login_details: watch::Sender<Option<LoginDetails>>,
}

impl Default for SessionSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSignals {
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            paused: watch::channel(false).0,
            destroyed: watch::channel(false).0,
            login_details: watch::channel(None).0,
        }
    }

    /// Mark initialized; returns `false` if it already was.
    pub fn mark_initialized(&self) -> bool {
        !self.initialized.swap(true, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.send_replace(paused);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    #[must_use]
    pub fn subscribe_paused(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    /// Mark destroyed; returns `true` on the first call only.
    pub fn mark_destroyed(&self) -> bool {
        !self.destroyed.send_replace(true)
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        *self.destroyed.borrow()
    }

    #[must_use]
    pub fn subscribe_destroyed(&self) -> watch::Receiver<bool> {
        self.destroyed.subscribe()
    }

    /// Supply credential collaborators, replacing earlier ones.
    pub fn supply_login_details(&self, details: LoginDetails) {
        self.login_details.send_replace(Some(details));
    }

    #[must_use]
    pub fn subscribe_login_details(&self) -> watch::Receiver<Option<LoginDetails>> {
        self.login_details.subscribe()
    }
}
