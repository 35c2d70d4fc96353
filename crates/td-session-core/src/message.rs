//! Engine message envelope.
//!
//! Every message exchanged with the engine is a flat JSON object carrying a
//! discriminant (`@type`) and, for request/response/error triples, a
//! correlation field (`@extra`).

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{RemoteError, SessionError};

/// Discriminant field name.
pub const TYPE_FIELD: &str = "@type";

/// Correlation field name.
pub const EXTRA_FIELD: &str = "@extra";

/// Discriminant of engine error messages.
pub const ERROR_TYPE: &str = "error";

/// Correlation value reserved for requests the session sends on its own behalf.
const INTERNAL_EXTRA: &str = "td-session:internal";

/// Correlation identifier linking a request to its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrelationId {
    /// Sent by the session machinery, not awaited by any caller.
    Internal,
    /// Issued for one caller request.
    Request(Uuid),
}

impl CorrelationId {
    /// Generate a fresh request id.
    #[must_use]
    pub fn generate() -> Self {
        Self::Request(Uuid::new_v4())
    }

    /// Interpret a correlation field value.
    ///
    /// Values this session never issued yield `None`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let raw = value.as_str()?;
        if raw == INTERNAL_EXTRA {
            return Some(Self::Internal);
        }
        Uuid::parse_str(raw).ok().map(Self::Request)
    }

    /// Encode as a correlation field value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }

    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => f.write_str(INTERNAL_EXTRA),
            Self::Request(id) => write!(f, "{id}"),
        }
    }
}

/// A single engine message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Map<String, Value>);

impl Message {
    /// Wrap a JSON value; only objects are valid messages.
    ///
    /// # Errors
    /// Returns error if the value is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self, SessionError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SessionError::InvalidMessage(format!(
                "expected object, got {other}"
            ))),
        }
    }

    /// Serialize a typed request into a message.
    ///
    /// # Errors
    /// Returns error if serialization fails or does not produce an object.
    pub fn from_request<T: Serialize + ?Sized>(request: &T) -> Result<Self, SessionError> {
        Self::from_value(serde_json::to_value(request)?)
    }

    /// Parse the whole message as a typed value.
    ///
    /// # Errors
    /// Returns error if the message does not match `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0.clone()))
    }

    /// The discriminant, if present.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.0.get(TYPE_FIELD).and_then(Value::as_str)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind() == Some(ERROR_TYPE)
    }

    /// Raw correlation field.
    #[must_use]
    pub fn extra(&self) -> Option<&Value> {
        self.0.get(EXTRA_FIELD)
    }

    /// Correlation id, if the field holds one this session issued.
    #[must_use]
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.extra().and_then(CorrelationId::from_value)
    }

    pub fn set_correlation_id(&mut self, id: CorrelationId) {
        self.0.insert(EXTRA_FIELD.to_string(), id.to_value());
    }

    /// Drop the correlation field.
    #[must_use]
    pub fn without_extra(mut self) -> Self {
        self.0.remove(EXTRA_FIELD);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Interpret an `error` message.
    ///
    /// Missing fields default to code 0 and an empty message.
    #[must_use]
    pub fn to_remote_error(&self) -> RemoteError {
        let code = self
            .0
            .get("code")
            .and_then(Value::as_i64)
            .and_then(|c| i32::try_from(c).ok())
            .unwrap_or_default();
        let message = self
            .0
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        RemoteError { code, message }
    }
}

impl From<Map<String, Value>> for Message {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Message {
    type Error = SessionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}
