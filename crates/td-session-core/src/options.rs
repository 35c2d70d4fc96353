//! Session configuration.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Default engine receive timeout.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default event bus depth.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Local configuration forwarded to the engine during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TdlibParameters {
    pub use_file_database: bool,
    pub use_chat_info_database: bool,
    pub use_message_database: bool,
    pub use_secret_chats: bool,
    pub system_language_code: String,
    pub device_model: String,
    pub system_version: String,
    pub application_version: String,
    pub enable_storage_optimizer: bool,
    pub ignore_file_names: bool,
}

impl Default for TdlibParameters {
    fn default() -> Self {
        Self {
            use_file_database: true,
            use_chat_info_database: true,
            use_message_database: true,
            use_secret_chats: false,
            system_language_code: "en".to_string(),
            device_model: "Unknown device".to_string(),
            system_version: "Unknown".to_string(),
            application_version: "1.0".to_string(),
            enable_storage_optimizer: true,
            ignore_file_names: false,
        }
    }
}

/// Session options.
///
/// Everything except the API credentials has a usable default, so a JSON
/// configuration only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub api_id: i32,
    pub api_hash: String,
    pub database_directory: PathBuf,
    pub files_directory: PathBuf,
    pub database_encryption_key: String,
    pub use_test_dc: bool,
    /// Drop ordinary updates while the connection is replaying its backlog.
    pub skip_old_updates: bool,
    #[serde(with = "duration_secs")]
    pub receive_timeout: Duration,
    /// Engine log verbosity applied at initialization; `None` leaves it alone.
    pub verbosity_level: Option<i32>,
    pub event_capacity: usize,
    pub tdlib_parameters: TdlibParameters,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_id: 0,
            api_hash: String::new(),
            database_directory: PathBuf::from("_td_database"),
            files_directory: PathBuf::from("_td_files"),
            database_encryption_key: String::new(),
            use_test_dc: false,
            skip_old_updates: false,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            verbosity_level: Some(1),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            tdlib_parameters: TdlibParameters::default(),
        }
    }
}

impl ClientOptions {
    /// Create options with API credentials and defaults for everything else.
    #[must_use]
    pub fn new(api_id: i32, api_hash: impl Into<String>) -> Self {
        Self {
            api_id,
            api_hash: api_hash.into(),
            ..Self::default()
        }
    }

    /// Parse options from JSON; omitted fields take their defaults.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn with_database_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.database_directory = dir.into();
        self
    }

    #[must_use]
    pub fn with_files_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.files_directory = dir.into();
        self
    }

    #[must_use]
    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.database_encryption_key = key.into();
        self
    }

    #[must_use]
    pub const fn with_test_dc(mut self, use_test_dc: bool) -> Self {
        self.use_test_dc = use_test_dc;
        self
    }

    #[must_use]
    pub const fn with_skip_old_updates(mut self, skip: bool) -> Self {
        self.skip_old_updates = skip;
        self
    }

    #[must_use]
    pub const fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_verbosity_level(mut self, level: Option<i32>) -> Self {
        self.verbosity_level = level;
        self
    }

    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_tdlib_parameters(mut self, parameters: TdlibParameters) -> Self {
        self.tdlib_parameters = parameters;
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::new(94575, "hash");
        assert_eq!(options.receive_timeout, Duration::from_secs(10));
        assert_eq!(options.database_directory, PathBuf::from("_td_database"));
        assert!(!options.skip_old_updates);
        assert!(options.tdlib_parameters.use_message_database);
    }

    #[test]
    fn test_partial_json() {
        let options = ClientOptions::from_json(
            r#"{"api_id": 7, "api_hash": "abc", "receive_timeout": 0.5, "skip_old_updates": true,
                "tdlib_parameters": {"device_model": "Server"}}"#,
        )
        .unwrap();
        assert_eq!(options.api_id, 7);
        assert_eq!(options.receive_timeout, Duration::from_millis(500));
        assert!(options.skip_old_updates);
        assert_eq!(options.tdlib_parameters.device_model, "Server");
        assert_eq!(options.tdlib_parameters.system_language_code, "en");
        assert_eq!(options.files_directory, PathBuf::from("_td_files"));
    }

    #[test]
    fn test_negative_timeout_rejected() {
        assert!(ClientOptions::from_json(r#"{"receive_timeout": -1}"#).is_err());
    }
}
