//! Session controller.
//!
//! [`Session`] owns the engine handle and composes the request correlator,
//! the event bus, the connect/login gates and the receive loop.
//!
//! # Pending requests at teardown
//!
//! `destroy()` abandons outstanding `invoke` futures: they are neither
//! resolved nor rejected and stay pending for as long as the session value is
//! alive. Treat [`SessionEvent::Destroy`] as the signal that no further
//! replies will arrive.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use td_session_core::{
    ClientOptions, CorrelationId, DeferredGate, Engine, EngineHandle, EventBus, EventKind,
    FatalErrorCallback, Message, SessionError, SessionEvent, Subscription,
};

use crate::{
    auth::LoginDetails, pending::PendingRequests, protocol::SessionRequest, receive_loop,
    state::SessionSignals,
};

type Gate = DeferredGate<(), SessionError>;

/// The engine handle and whether the receive loop is inside `receive` on it.
///
/// A handle is released exactly once: by `destroy()` when no receive is in
/// flight, otherwise by the loop as soon as that receive returns.
#[derive(Debug, Default)]
struct EngineSlot {
    handle: Option<EngineHandle>,
    receiving: bool,
}

/// State shared by the session handle and its receive loop.
pub(crate) struct SessionInner {
    engine: Arc<dyn Engine>,
    slot: Mutex<EngineSlot>,
    options: ClientOptions,
    pending: PendingRequests,
    events: EventBus,
    connect_gate: Gate,
    login_gate: Gate,
    signals: SessionSignals,
}

impl SessionInner {
    fn lock_slot(&self) -> MutexGuard<'_, EngineSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn handle(&self) -> Option<EngineHandle> {
        self.lock_slot().handle
    }

    /// Run `f` against the live handle.
    ///
    /// The slot stays locked for the call, so `destroy()` cannot release the
    /// handle while `f` uses it. `f` must not block.
    fn with_handle<R>(
        &self,
        f: impl FnOnce(EngineHandle) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        let slot = self.lock_slot();
        match slot.handle {
            Some(handle) => f(handle),
            None if self.signals.is_destroyed() => Err(SessionError::Destroyed),
            None => Err(SessionError::NotInitialized),
        }
    }

    /// Lease the handle for one `receive`; `None` once destroyed.
    pub(crate) fn begin_receive(&self) -> Option<EngineHandle> {
        let mut slot = self.lock_slot();
        let handle = slot.handle?;
        slot.receiving = true;
        Some(handle)
    }

    /// End a receive lease.
    ///
    /// Returns `false` if the session was destroyed during the receive, in
    /// which case the handle is released here.
    pub(crate) fn end_receive(&self, handle: EngineHandle) -> bool {
        let mut slot = self.lock_slot();
        slot.receiving = false;
        if slot.handle.is_some() {
            return true;
        }
        drop(slot);
        self.release(handle);
        false
    }

    fn release(&self, handle: EngineHandle) {
        self.engine.destroy(handle);
        tracing::info!(%handle, abandoned = self.pending.len(), "engine instance destroyed");
    }

    pub(crate) const fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub(crate) const fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub(crate) const fn signals(&self) -> &SessionSignals {
        &self.signals
    }

    pub(crate) const fn connect_gate(&self) -> &Gate {
        &self.connect_gate
    }

    pub(crate) const fn login_gate(&self) -> &Gate {
        &self.login_gate
    }

    pub(crate) fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        self.events.publish(event);
    }

    /// Create the engine instance.
    ///
    /// Creation failure rejects the connect gate rather than returning an
    /// error, so it reaches whoever awaits `connect()`.
    pub(crate) fn create_engine(&self) -> Result<bool, SessionError> {
        if self.signals.is_destroyed() {
            return Err(SessionError::Destroyed);
        }
        if !self.signals.mark_initialized() {
            return Err(SessionError::AlreadyInitialized);
        }

        if let Some(level) = self.options.verbosity_level {
            let request = Message::from_request(&SessionRequest::SetLogVerbosityLevel {
                new_verbosity_level: level,
            })?;
            if let Err(e) = self.engine.execute(None, &request) {
                tracing::warn!("failed to set engine log verbosity: {e}");
            }
        }

        match self.engine.create() {
            Ok(handle) => {
                tracing::info!(%handle, "engine instance created");
                self.lock_slot().handle = Some(handle);
                Ok(true)
            }
            Err(e) => {
                tracing::error!("failed to create engine instance: {e}");
                self.connect_gate.reject(SessionError::Engine(e));
                Ok(false)
            }
        }
    }

    /// Send a request on the session's own behalf.
    pub(crate) fn send_internal(&self, request: &SessionRequest) -> Result<(), SessionError> {
        let mut message = Message::from_request(request)?;
        message.set_correlation_id(CorrelationId::Internal);
        tracing::debug!(kind = request.kind(), "sending session request");
        self.with_handle(|handle| {
            self.engine.send(handle, &message);
            Ok(())
        })
    }

    /// Tear the session down. Outstanding requests are abandoned.
    ///
    /// If the receive loop is inside `receive`, releasing the handle is left
    /// to the loop once that call returns.
    pub(crate) fn destroy(&self) {
        let (handle, receiving) = {
            let mut slot = self.lock_slot();
            (slot.handle.take(), slot.receiving)
        };
        let first = self.signals.mark_destroyed();
        match handle {
            Some(handle) if receiving => {
                tracing::debug!(%handle, "engine release deferred to receive loop");
            }
            Some(handle) => self.release(handle),
            None => {}
        }
        if first {
            self.events.publish(SessionEvent::Destroy);
        }
    }
}

/// Destroys the session once the last [`Session`] clone is dropped.
///
/// The receive loop keeps its own `Arc<SessionInner>`, so without this the
/// loop would poll a handle nobody can reach.
struct LastHandle(Arc<SessionInner>);

impl Drop for LastHandle {
    fn drop(&mut self) {
        if !self.0.signals.is_destroyed() {
            tracing::debug!("last session handle dropped");
            self.0.destroy();
        }
    }
}

/// Client session over an engine instance.
///
/// Cheap to clone; clones share the same session. Dropping the last clone
/// destroys the session, as `destroy()` would.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
    _last: Arc<LastHandle>,
}

impl Session {
    /// Create a session. Nothing touches the engine until `connect()`.
    #[must_use]
    pub fn new(engine: Arc<dyn Engine>, options: ClientOptions) -> Self {
        let events = EventBus::new(options.event_capacity);
        let inner = Arc::new(SessionInner {
            engine,
            slot: Mutex::new(EngineSlot::default()),
            options,
            pending: PendingRequests::new(),
            events,
            connect_gate: Gate::new(),
            login_gate: Gate::new(),
            signals: SessionSignals::new(),
        });
        Self {
            _last: Arc::new(LastHandle(Arc::clone(&inner))),
            inner,
        }
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &SessionInner {
        &self.inner
    }

    #[cfg(test)]
    pub(crate) const fn inner_arc(&self) -> &Arc<SessionInner> {
        &self.inner
    }

    /// Create the engine instance, start the receive loop and wait until the
    /// engine accepted the local configuration.
    ///
    /// # Errors
    /// Returns error if called twice, after `destroy()`, if the engine cannot
    /// be created, or if the engine closes before the handshake.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.inner.create_engine()? {
            receive_loop::spawn(Arc::clone(&self.inner));
        }
        settle(self.inner.connect_gate.wait()).await
    }

    /// Supply credential collaborators and wait until authorization completes.
    ///
    /// Safe to call before or after the engine first asks for credentials.
    /// The authorization outcome is delivered to one caller only: a `login()`
    /// that starts after an earlier one already received it, or that is
    /// replaced by a later one before authorization completes, returns
    /// [`SessionError::Superseded`].
    ///
    /// # Errors
    /// Returns error if a credential prompt fails, if the engine closes, if
    /// the session is destroyed, or if the outcome went to another caller.
    pub async fn login<F>(&self, get_login_details: F) -> Result<(), SessionError>
    where
        F: FnOnce() -> LoginDetails,
    {
        if self.inner.signals.is_destroyed() {
            return Err(SessionError::Destroyed);
        }
        let authorized = self.inner.login_gate.wait();
        self.inner.signals.supply_login_details(get_login_details());
        settle(authorized).await
    }

    /// `connect()` followed by `login()`.
    ///
    /// # Errors
    /// Returns the first error of either step.
    pub async fn connect_and_login<F>(&self, get_login_details: F) -> Result<(), SessionError>
    where
        F: FnOnce() -> LoginDetails,
    {
        self.connect().await?;
        self.login(get_login_details).await
    }

    /// Send a request and wait for its correlated response or error.
    ///
    /// The response is returned without its correlation field.
    ///
    /// # Errors
    /// Returns the engine's error for this request, or an error if the
    /// request is not an object or the session is not running.
    pub async fn invoke<R: Serialize>(&self, request: R) -> Result<Message, SessionError> {
        let mut message = Message::from_request(&request)?;
        let id = CorrelationId::generate();
        message.set_correlation_id(id);

        tracing::trace!(%id, kind = ?message.kind(), "invoking request");
        let reply = self.inner.with_handle(|handle| {
            let reply = self.inner.pending.register(id)?;
            self.inner.engine.send(handle, &message);
            Ok(reply)
        })?;

        match reply.await {
            Ok(result) => result.map_err(SessionError::from),
            Err(_) => Err(SessionError::Destroyed),
        }
    }

    /// Synchronous engine call for requests answered without the queue.
    ///
    /// # Errors
    /// Returns error if the request is not an object or the engine fails.
    pub fn execute<R: Serialize>(&self, request: R) -> Result<Option<Message>, SessionError> {
        let message = Message::from_request(&request)?;
        let slot = self.inner.lock_slot();
        Ok(self.inner.engine.execute(slot.handle, &message)?)
    }

    /// Stop delivering messages; the engine connection stays up.
    pub fn pause(&self) {
        tracing::debug!("pausing session");
        self.inner.signals.set_paused(true);
    }

    pub fn resume(&self) {
        tracing::debug!("resuming session");
        self.inner.signals.set_paused(false);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.signals.is_paused()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.signals.is_destroyed()
    }

    /// Ask the engine to shut down and wait until the session is destroyed.
    ///
    /// # Errors
    /// Returns error if the close request cannot be sent.
    pub async fn close(&self) -> Result<(), SessionError> {
        let mut destroyed = self.inner.signals.subscribe_destroyed();
        if self.inner.handle().is_none() {
            return Ok(());
        }
        tracing::info!("closing session");
        match self.inner.send_internal(&SessionRequest::Close {}) {
            Ok(()) | Err(SessionError::Destroyed) => {}
            Err(e) => return Err(e),
        }
        let _ = destroyed.wait_for(|destroyed| *destroyed).await;
        Ok(())
    }

    /// Tear the session down and publish `destroy`.
    ///
    /// The engine handle is released right away, or as soon as an in-flight
    /// receive on it returns. Outstanding `invoke` futures are abandoned, not
    /// rejected.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Subscribe to every session event.
    ///
    /// Each subscription buffers at most `ClientOptions::event_capacity`
    /// events. A subscriber that falls further behind loses the oldest ones,
    /// privileged updates included; [`Subscription::skipped`] reports how
    /// many.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.inner.events.subscribe()
    }

    /// Subscribe to the given event kinds. Buffered like [`Session::subscribe`].
    #[must_use]
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> Subscription {
        self.inner.events.subscribe_to(kinds)
    }

    /// Register the engine's process-wide fatal error hook.
    pub fn set_log_fatal_error_callback(&self, callback: Option<FatalErrorCallback>) {
        self.inner.engine.set_log_fatal_error_callback(callback);
    }
}

async fn settle(
    outcome: impl Future<Output = Option<Result<(), SessionError>>>,
) -> Result<(), SessionError> {
    outcome.await.unwrap_or(Err(SessionError::Superseded))
}
