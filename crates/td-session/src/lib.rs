//! Session management over an asynchronous JSON message engine.
//!
//! Provides:
//! - `Session` - Connect, authenticate and correlate requests with responses
//! - `LoginDetails` - Credential collaborators for user and bot logins
//! - `Router` / `PendingRequests` - Incoming message dispatch

pub mod auth;
pub mod pending;
pub mod protocol;
mod receive_loop;
pub mod router;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;

pub use auth::{BotAuthenticator, LoginDetails, RegistrationName, StaticBotToken, UserAuthenticator};
pub use session::Session;
pub use td_session_core::{
    ClientOptions, Engine, EngineHandle, EventKind, Message, SessionError, SessionEvent,
    Subscription,
};
