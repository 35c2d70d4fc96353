//! Pending request registry.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use td_session_core::{CorrelationId, CorrelatorError, Message, RemoteError};
use tokio::sync::oneshot;

/// Outcome delivered to a waiting caller.
pub type Reply = Result<Message, RemoteError>;

/// A caller awaiting exactly one reply.
///
/// Consumed by `resolve`/`reject`, so it can settle at most once.
#[derive(Debug)]
pub struct PendingRequest {
    id: CorrelationId,
    reply: oneshot::Sender<Reply>,
}

impl PendingRequest {
    #[must_use]
    pub const fn id(&self) -> CorrelationId {
        self.id
    }

    pub fn resolve(self, response: Message) {
        let _ = self.reply.send(Ok(response));
    }

    pub fn reject(self, error: RemoteError) {
        let _ = self.reply.send(Err(error));
    }
}

/// Correlation id to pending caller map.
///
/// `register`, `resolve` and `reject` are the only mutation entry points.
#[derive(Debug, Default)]
pub struct PendingRequests {
    requests: Mutex<HashMap<CorrelationId, PendingRequest>>,
}

impl PendingRequests {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationId, PendingRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a caller under `id` and return the receiving end of its reply.
    ///
    /// # Errors
    /// Returns error if `id` is already pending.
    pub fn register(&self, id: CorrelationId) -> Result<oneshot::Receiver<Reply>, CorrelatorError> {
        let mut requests = self.lock();
        if requests.contains_key(&id) {
            return Err(CorrelatorError::Duplicate(id));
        }
        let (reply, rx) = oneshot::channel();
        requests.insert(id, PendingRequest { id, reply });
        tracing::trace!(%id, pending = requests.len(), "registered pending request");
        Ok(rx)
    }

    fn take(&self, id: CorrelationId) -> Option<PendingRequest> {
        self.lock().remove(&id)
    }

    /// Deliver a response to the caller registered under `id`.
    ///
    /// # Errors
    /// Hands the message back if nobody is waiting for `id`.
    pub fn resolve(&self, id: CorrelationId, response: Message) -> Result<(), Message> {
        match self.take(id) {
            Some(pending) => {
                pending.resolve(response);
                Ok(())
            }
            None => Err(response),
        }
    }

    /// Deliver an error to the caller registered under `id`.
    ///
    /// # Errors
    /// Hands the error back if nobody is waiting for `id`.
    pub fn reject(&self, id: CorrelationId, error: RemoteError) -> Result<(), RemoteError> {
        match self.take(id) {
            Some(pending) => {
                pending.reject(error);
                Ok(())
            }
            None => Err(error),
        }
    }

    #[must_use]
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.lock().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::oneshot::error::TryRecvError;

    use super::*;

    fn msg(kind: &str) -> Message {
        Message::from_value(json!({"@type": kind})).unwrap()
    }

    fn remote(message: &str) -> RemoteError {
        RemoteError {
            code: 400,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_resolving_one_id_leaves_others_pending() {
        let pending = PendingRequests::new();
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        let mut rx_a = pending.register(a).unwrap();
        let mut rx_b = pending.register(b).unwrap();

        pending.resolve(a, msg("ok")).unwrap();

        assert_eq!(rx_a.try_recv().unwrap().unwrap().kind(), Some("ok"));
        assert!(matches!(rx_b.try_recv(), Err(TryRecvError::Empty)));
        assert!(pending.contains(b));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_reject_delivers_error() {
        let pending = PendingRequests::new();
        let id = CorrelationId::generate();
        let mut rx = pending.register(id).unwrap();

        pending.reject(id, remote("CHAT_NOT_FOUND")).unwrap();

        assert_eq!(rx.try_recv().unwrap().unwrap_err(), remote("CHAT_NOT_FOUND"));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_second_resolution_is_noop() {
        let pending = PendingRequests::new();
        let id = CorrelationId::generate();
        let mut rx = pending.register(id).unwrap();

        assert!(pending.resolve(id, msg("first")).is_ok());
        let second = pending.resolve(id, msg("second"));
        assert_eq!(second.unwrap_err().kind(), Some("second"));
        assert!(pending.reject(id, remote("late")).is_err());

        assert_eq!(rx.try_recv().unwrap().unwrap().kind(), Some("first"));
    }

    #[test]
    fn test_duplicate_register_fails() {
        let pending = PendingRequests::new();
        let id = CorrelationId::generate();
        let _rx = pending.register(id).unwrap();
        assert!(matches!(
            pending.register(id),
            Err(CorrelatorError::Duplicate(dup)) if dup == id
        ));
    }

    #[test]
    fn test_unknown_id_hands_message_back() {
        let pending = PendingRequests::new();
        let returned = pending.resolve(CorrelationId::generate(), msg("updateUser"));
        assert_eq!(returned.unwrap_err().kind(), Some("updateUser"));
    }
}
