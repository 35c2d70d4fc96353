//! Error types shared by the session layers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::CorrelationId;

/// Engine collaborator error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to create engine instance: {0}")]
    CreateFailed(String),
    #[error("Receive failed: {0}")]
    Receive(String),
    #[error("Execute failed: {0}")]
    Execute(String),
    #[error("Malformed engine message: {0}")]
    Malformed(String),
}

/// An `error` message reported by the engine, without its correlation field.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Engine error {code}: {message}")]
pub struct RemoteError {
    pub code: i32,
    pub message: String,
}

/// Credential collaborator error.
#[derive(Debug, Clone, Error)]
pub enum LoginError {
    #[error("Login prompt not supported: {0}")]
    Unsupported(&'static str),
    #[error("Login cancelled")]
    Cancelled,
    #[error("Login failed: {0}")]
    Failed(String),
}

/// Request correlator error.
#[derive(Debug, Clone, Error)]
pub enum CorrelatorError {
    #[error("Correlation id already pending: {0}")]
    Duplicate(CorrelationId),
}

/// Session error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session is already initialized")]
    AlreadyInitialized,
    #[error("Session is not initialized")]
    NotInitialized,
    #[error("Session has been destroyed")]
    Destroyed,
    #[error("Received authorizationStateClosed")]
    AuthorizationClosed,
    #[error("Waiter superseded by a later call")]
    Superseded,
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    Correlator(#[from] CorrelatorError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}
