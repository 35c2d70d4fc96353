//! Incoming message classification.

use td_session_core::{CorrelationId, Message, RemoteError};

use crate::{
    pending::PendingRequests,
    protocol::{ConnectionState, PrivilegedUpdate},
};

/// Where an incoming message went.
#[derive(Debug)]
pub enum Route {
    /// Handed to the pending caller that issued the request.
    Delivered,
    /// Error answering a request the session sent on its own behalf.
    AuthError(RemoteError),
    /// Error nobody is waiting for.
    Uncorrelated(RemoteError),
    /// Server-initiated update (or a reply nobody awaits).
    Update(Message),
}

/// What to do with an update.
#[derive(Debug, PartialEq, Eq)]
pub enum UpdateDisposition {
    /// Publish, then apply session bookkeeping.
    Privileged(PrivilegedUpdate),
    Publish,
    /// Dropped by the backlog policy.
    Suppress,
}

/// Message router.
///
/// Owns the last reported [`ConnectionState`].
#[derive(Debug, Default)]
pub struct Router {
    skip_old_updates: bool,
    connection_state: ConnectionState,
}

impl Router {
    #[must_use]
    pub fn new(skip_old_updates: bool) -> Self {
        Self {
            skip_old_updates,
            connection_state: ConnectionState::default(),
        }
    }

    #[must_use]
    pub const fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    /// Classify a message, settling the matching pending request if any.
    pub fn classify(&self, message: Message, pending: &PendingRequests) -> Route {
        let id = message.correlation_id();

        if message.is_error() {
            let error = message.to_remote_error();
            return match id {
                Some(CorrelationId::Internal) => Route::AuthError(error),
                Some(id) => pending
                    .reject(id, error)
                    .map_or_else(Route::Uncorrelated, |()| Route::Delivered),
                None => Route::Uncorrelated(error),
            };
        }

        match id {
            Some(id) if !id.is_internal() && pending.contains(id) => {
                match pending.resolve(id, message.without_extra()) {
                    Ok(()) => Route::Delivered,
                    Err(message) => Route::Update(message),
                }
            }
            _ => Route::Update(message),
        }
    }

    /// Decide whether an update is published.
    ///
    /// Privileged updates always are; others are dropped while the
    /// connection replays its backlog, if configured to skip it.
    pub fn filter_update(&mut self, update: &Message) -> UpdateDisposition {
        let kind = update.kind().unwrap_or_default();

        if PrivilegedUpdate::is_privileged(kind) {
            return match update.parse::<PrivilegedUpdate>() {
                Ok(privileged) => {
                    if let PrivilegedUpdate::UpdateConnectionState { state } = &privileged {
                        tracing::debug!(?state, "connection state changed");
                        self.connection_state = *state;
                    }
                    UpdateDisposition::Privileged(privileged)
                }
                Err(e) => {
                    tracing::warn!(kind, "failed to parse privileged update: {e}");
                    UpdateDisposition::Publish
                }
            };
        }

        if self.skip_old_updates && self.connection_state == ConnectionState::Updating {
            tracing::trace!(kind, "suppressing backlog update");
            UpdateDisposition::Suppress
        } else {
            UpdateDisposition::Publish
        }
    }
}
