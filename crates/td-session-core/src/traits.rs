//! Engine collaborator trait.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{error::EngineError, message::Message};

/// Opaque engine instance handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(u64);

impl EngineHandle {
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Process-wide fatal error hook.
pub type FatalErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Trait for message engines.
///
/// Implement this for the native library binding. The session layer only
/// talks to the engine through these calls.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Create a new engine instance.
    ///
    /// # Errors
    /// Returns error if the engine cannot be initialized.
    fn create(&self) -> Result<EngineHandle, EngineError>;

    /// Send a request. Fire-and-forget.
    fn send(&self, handle: EngineHandle, message: &Message);

    /// Wait up to `timeout` for the next message; `None` on timeout.
    ///
    /// # Errors
    /// Returns error if the engine fails to produce a message.
    async fn receive(
        &self,
        handle: EngineHandle,
        timeout: Duration,
    ) -> Result<Option<Message>, EngineError>;

    /// Answer a request synchronously, bypassing the asynchronous queue.
    ///
    /// # Errors
    /// Returns error if the request cannot be executed.
    fn execute(
        &self,
        handle: Option<EngineHandle>,
        message: &Message,
    ) -> Result<Option<Message>, EngineError>;

    /// Release an engine instance.
    fn destroy(&self, handle: EngineHandle);

    /// Register (or clear) the fatal error hook.
    fn set_log_fatal_error_callback(&self, callback: Option<FatalErrorCallback>);
}
