//! Typed publish/subscribe channel for session events.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use crate::{error::SessionError, message::Message, options::DEFAULT_EVENT_CAPACITY};

/// Event published by a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Server-initiated update.
    Update(Message),
    /// Raw message as pulled from the engine, before routing.
    Response(Message),
    /// Failure with no pending request or gate to deliver it to.
    Error(Arc<SessionError>),
    /// The engine instance was released.
    Destroy,
    /// Credentials are required; published at most once per session.
    AuthNeeded,
    /// Authorization completed without ever asking for credentials.
    AuthNotNeeded,
}

/// Discriminant of [`SessionEvent`], used for filtered subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Update,
    Response,
    Error,
    Destroy,
    AuthNeeded,
    AuthNotNeeded,
}

impl SessionEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Update(_) => EventKind::Update,
            Self::Response(_) => EventKind::Response,
            Self::Error(_) => EventKind::Error,
            Self::Destroy => EventKind::Destroy,
            Self::AuthNeeded => EventKind::AuthNeeded,
            Self::AuthNotNeeded => EventKind::AuthNotNeeded,
        }
    }

    /// Wrap an error for publication.
    #[must_use]
    pub fn error(error: impl Into<SessionError>) -> Self {
        Self::Error(Arc::new(error.into()))
    }
}

/// In-process event bus.
///
/// Delivery order equals publish order. Subscribers only see events
/// published after they subscribed.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to every current subscriber.
    pub fn publish(&self, event: SessionEvent) {
        tracing::trace!(kind = ?event.kind(), "publishing session event");
        let _ = self.sender.send(event);
    }

    /// Subscribe to every event kind.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            kinds: None,
            skipped: 0,
        }
    }

    /// Subscribe to the given event kinds only.
    #[must_use]
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            kinds: Some(kinds.to_vec()),
            skipped: 0,
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Registration handle; dropping it (or calling `unsubscribe`) removes it.
///
/// Each subscriber buffers at most the bus capacity. Events overwritten
/// before they were read are lost, privileged updates included; `skipped`
/// counts them.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<SessionEvent>,
    kinds: Option<Vec<EventKind>>,
    skipped: u64,
}

impl Subscription {
    fn accepts(&self, event: &SessionEvent) -> bool {
        self.kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&event.kind()))
    }

    /// Next matching event; `None` once the bus is gone.
    ///
    /// A subscriber that falls behind skips the overwritten events.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                    self.skipped += skipped;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                    self.skipped += skipped;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Stream of matching events.
    #[must_use]
    pub fn into_stream(self) -> futures::stream::BoxStream<'static, SessionEvent> {
        let Self { receiver, kinds, .. } = self;
        BroadcastStream::new(receiver)
            .filter_map(move |res| {
                let accepted = match res {
                    Ok(event)
                        if kinds
                            .as_ref()
                            .is_none_or(|kinds| kinds.contains(&event.kind())) =>
                    {
                        Some(event)
                    }
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event stream lagged");
                        None
                    }
                };
                futures::future::ready(accepted)
            })
            .boxed()
    }

    /// Events lost so far because this subscriber fell behind.
    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn unsubscribe(self) {}
}
