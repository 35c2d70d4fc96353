//! Single-fire deferred outcome.
//!
//! A `DeferredGate` lets an asynchronous handshake settle before or after a
//! consumer starts listening. The first `resolve`/`reject` wins; the attached
//! resolver fires at most once, ever.

use std::{
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::oneshot;

type Resolver<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

enum GateState<T, E> {
    /// Not settled. Holds the latest registered resolver, if any.
    Pending(Option<Resolver<T, E>>),
    /// Settled with nobody listening yet.
    Held(Result<T, E>),
    /// Outcome delivered.
    Fired,
}

/// Single-fire promise primitive.
pub struct DeferredGate<T, E> {
    state: Mutex<GateState<T, E>>,
}

impl<T, E> Default for DeferredGate<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> DeferredGate<T, E> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Pending(None)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach the outcome handler.
    ///
    /// Replaces a previously registered handler that has not fired yet. If the
    /// gate already holds an outcome the handler runs immediately; if the
    /// outcome was already delivered this is a no-op.
    pub fn set_resolver<F>(&self, resolver: F)
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, GateState::Fired) {
            GateState::Pending(_) => *state = GateState::Pending(Some(Box::new(resolver))),
            GateState::Held(outcome) => {
                drop(state);
                resolver(outcome);
            }
            GateState::Fired => {}
        }
    }

    /// Settle successfully. No-op if already settled.
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    /// Settle with an error. No-op if already settled.
    pub fn reject(&self, error: E) {
        self.settle(Err(error));
    }

    fn settle(&self, outcome: Result<T, E>) {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, GateState::Fired) {
            GateState::Pending(Some(resolver)) => {
                drop(state);
                resolver(outcome);
            }
            GateState::Pending(None) => *state = GateState::Held(outcome),
            settled @ GateState::Held(_) => *state = settled,
            GateState::Fired => {}
        }
    }

    /// True until the first `resolve`/`reject`.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(*self.lock(), GateState::Pending(_))
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        !self.is_pending()
    }

    /// True while a registered resolver waits for the outcome.
    #[must_use]
    pub fn has_resolver(&self) -> bool {
        matches!(*self.lock(), GateState::Pending(Some(_)))
    }
}

impl<T, E> DeferredGate<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Register a channel-backed resolver and return a future for the outcome.
    ///
    /// The future yields `None` if a later registration replaced this one
    /// before the gate settled, or if the outcome was already delivered.
    pub fn wait(&self) -> impl Future<Output = Option<Result<T, E>>> + Send + use<T, E> {
        let (tx, rx) = oneshot::channel();
        self.set_resolver(move |outcome| {
            let _ = tx.send(outcome);
        });
        async move { rx.await.ok() }
    }
}
