//! Core abstractions for sessions over an asynchronous JSON message engine.
//!
//! This crate provides the fundamental building blocks:
//! - `Message` / `CorrelationId` - The wire envelope
//! - `Engine` - The native engine collaborator trait
//! - `DeferredGate` - Single-fire outcome for connect/login synchronization
//! - `EventBus` - Typed publish/subscribe for session events
//! - `ClientOptions` - Session configuration

pub mod error;
pub mod event_bus;
pub mod gate;
pub mod message;
pub mod options;
pub mod traits;
pub mod version;

pub use error::{CorrelatorError, EngineError, LoginError, RemoteError, SessionError};
pub use event_bus::{EventBus, EventKind, SessionEvent, Subscription};
pub use gate::DeferredGate;
pub use message::{CorrelationId, Message};
pub use options::{ClientOptions, TdlibParameters};
pub use traits::{Engine, EngineHandle, FatalErrorCallback};
pub use version::EngineVersion;
