//! Typed requests the session sends on its own behalf, and the privileged
//! updates it interprets.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use td_session_core::{ClientOptions, EngineVersion, TdlibParameters};

/// Requests issued by the session machinery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum SessionRequest {
    /// Handshake for engines taking flattened parameters.
    SetTdlibParameters(FlatTdlibParameters),
    /// Handshake for engines taking a nested `tdlibParameters` object.
    #[serde(rename = "setTdlibParameters")]
    SetTdlibParametersLegacy { parameters: LegacyTdlibParameters },
    CheckDatabaseEncryptionKey { encryption_key: String },
    SetAuthenticationPhoneNumber { phone_number: String },
    SetAuthenticationEmailAddress { email_address: String },
    CheckAuthenticationEmailCode { code: EmailAddressAuthentication },
    CheckAuthenticationCode { code: String },
    CheckAuthenticationPassword { password: String },
    CheckAuthenticationBotToken { token: String },
    RegisterUser { first_name: String, last_name: String },
    SetLogVerbosityLevel { new_verbosity_level: i32 },
    Close {},
}

impl SessionRequest {
    /// Build the handshake request for the given engine version.
    ///
    /// An unknown version gets the flattened shape.
    #[must_use]
    pub fn tdlib_parameters(options: &ClientOptions, version: Option<EngineVersion>) -> Self {
        let common = CommonParameters::from_options(options);
        if version.is_none_or(EngineVersion::uses_flattened_parameters) {
            Self::SetTdlibParameters(FlatTdlibParameters {
                common,
                database_encryption_key: options.database_encryption_key.clone(),
            })
        } else {
            Self::SetTdlibParametersLegacy {
                parameters: LegacyTdlibParameters { common },
            }
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SetTdlibParameters(_) | Self::SetTdlibParametersLegacy { .. } => {
                "setTdlibParameters"
            }
            Self::CheckDatabaseEncryptionKey { .. } => "checkDatabaseEncryptionKey",
            Self::SetAuthenticationPhoneNumber { .. } => "setAuthenticationPhoneNumber",
            Self::SetAuthenticationEmailAddress { .. } => "setAuthenticationEmailAddress",
            Self::CheckAuthenticationEmailCode { .. } => "checkAuthenticationEmailCode",
            Self::CheckAuthenticationCode { .. } => "checkAuthenticationCode",
            Self::CheckAuthenticationPassword { .. } => "checkAuthenticationPassword",
            Self::CheckAuthenticationBotToken { .. } => "checkAuthenticationBotToken",
            Self::RegisterUser { .. } => "registerUser",
            Self::SetLogVerbosityLevel { .. } => "setLogVerbosityLevel",
            Self::Close {} => "close",
        }
    }
}

/// Fields shared by both handshake shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommonParameters {
    pub use_test_dc: bool,
    pub database_directory: PathBuf,
    pub files_directory: PathBuf,
    pub api_id: i32,
    pub api_hash: String,
    #[serde(flatten)]
    pub parameters: TdlibParameters,
}

impl CommonParameters {
    fn from_options(options: &ClientOptions) -> Self {
        Self {
            use_test_dc: options.use_test_dc,
            database_directory: options.database_directory.clone(),
            files_directory: options.files_directory.clone(),
            api_id: options.api_id,
            api_hash: options.api_hash.clone(),
            parameters: options.tdlib_parameters.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatTdlibParameters {
    #[serde(flatten)]
    pub common: CommonParameters,
    pub database_encryption_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "@type", rename = "tdlibParameters")]
pub struct LegacyTdlibParameters {
    #[serde(flatten)]
    pub common: CommonParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum EmailAddressAuthentication {
    EmailAddressAuthenticationCode { code: String },
}

/// Engine-reported stage of the login handshake.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "@type")]
pub enum AuthorizationState {
    #[serde(rename = "authorizationStateWaitTdlibParameters")]
    WaitTdlibParameters,
    #[serde(rename = "authorizationStateWaitEncryptionKey")]
    WaitEncryptionKey {
        #[serde(default)]
        is_encrypted: bool,
    },
    #[serde(rename = "authorizationStateWaitPhoneNumber")]
    WaitPhoneNumber,
    #[serde(rename = "authorizationStateWaitEmailAddress")]
    WaitEmailAddress,
    #[serde(rename = "authorizationStateWaitEmailCode")]
    WaitEmailCode,
    #[serde(rename = "authorizationStateWaitOtherDeviceConfirmation")]
    WaitOtherDeviceConfirmation { link: String },
    #[serde(rename = "authorizationStateWaitCode")]
    WaitCode,
    #[serde(rename = "authorizationStateWaitRegistration")]
    WaitRegistration,
    #[serde(rename = "authorizationStateWaitPassword")]
    WaitPassword {
        #[serde(default)]
        password_hint: String,
    },
    #[serde(rename = "authorizationStateReady")]
    Ready,
    #[serde(rename = "authorizationStateLoggingOut")]
    LoggingOut,
    #[serde(rename = "authorizationStateClosing")]
    Closing,
    #[serde(rename = "authorizationStateClosed")]
    Closed,
    #[serde(other)]
    Unknown,
}

impl AuthorizationState {
    /// Whether this state can only be left by supplying credentials.
    #[must_use]
    pub const fn needs_credentials(&self) -> bool {
        matches!(
            self,
            Self::WaitPhoneNumber
                | Self::WaitEmailAddress
                | Self::WaitEmailCode
                | Self::WaitOtherDeviceConfirmation { .. }
                | Self::WaitCode
                | Self::WaitRegistration
                | Self::WaitPassword { .. }
        )
    }
}

/// Engine-reported network state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "@type")]
pub enum ConnectionState {
    #[serde(rename = "connectionStateWaitingForNetwork")]
    WaitingForNetwork,
    #[serde(rename = "connectionStateConnectingToProxy")]
    ConnectingToProxy,
    #[default]
    #[serde(rename = "connectionStateConnecting")]
    Connecting,
    #[serde(rename = "connectionStateUpdating")]
    Updating,
    #[serde(rename = "connectionStateReady")]
    Ready,
    #[serde(other)]
    Unknown,
}

/// Updates that are always published and drive session bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum PrivilegedUpdate {
    UpdateOption { name: String, value: Value },
    UpdateConnectionState { state: ConnectionState },
    UpdateAuthorizationState { authorization_state: AuthorizationState },
}

impl PrivilegedUpdate {
    /// Discriminants of the privileged update kinds.
    pub const KINDS: [&'static str; 3] = [
        "updateOption",
        "updateConnectionState",
        "updateAuthorizationState",
    ];

    #[must_use]
    pub fn is_privileged(kind: &str) -> bool {
        Self::KINDS.contains(&kind)
    }

    /// Engine version carried by an `updateOption` for `version`.
    #[must_use]
    pub fn engine_version(&self) -> Option<EngineVersion> {
        let Self::UpdateOption { name, value } = self else {
            return None;
        };
        if name != "version" {
            return None;
        }
        value.get("value")?.as_str()?.parse().ok()
    }
}
