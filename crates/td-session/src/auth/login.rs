//! Credential collaborators supplied through `login()`.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use td_session_core::LoginError;

/// First and last name for account registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationName {
    pub first_name: String,
    pub last_name: String,
}

/// Trait for answering user-account login prompts.
///
/// Implement this to integrate with your prompt UI. `retry` is `true` when
/// the previous answer was rejected by the engine.
#[async_trait]
pub trait UserAuthenticator: Send + Sync {
    /// Phone number in international format.
    async fn phone_number(&self, retry: bool) -> Result<String, LoginError>;

    /// Login code sent to the user.
    async fn auth_code(&self, retry: bool) -> Result<String, LoginError>;

    /// Two-step verification password.
    async fn password(&self, hint: &str, retry: bool) -> Result<String, LoginError> {
        let _ = (hint, retry);
        Err(LoginError::Unsupported("password"))
    }

    async fn email_address(&self) -> Result<String, LoginError> {
        Err(LoginError::Unsupported("email address"))
    }

    async fn email_code(&self) -> Result<String, LoginError> {
        Err(LoginError::Unsupported("email code"))
    }

    /// Name for a phone number without an account.
    async fn registration_name(&self) -> Result<RegistrationName, LoginError> {
        Err(LoginError::Unsupported("registration"))
    }

    /// Show a link the user confirms from an already authorized device.
    async fn confirm_on_another_device(&self, link: &str) {
        tracing::info!(link, "confirm login on another device");
    }
}

/// Trait for answering bot login prompts.
#[async_trait]
pub trait BotAuthenticator: Send + Sync {
    async fn token(&self, retry: bool) -> Result<String, LoginError>;
}

/// Bot authenticator answering with a fixed token.
///
/// A fixed token cannot be corrected, so a retry is declined.
#[derive(Clone)]
pub struct StaticBotToken(String);

impl fmt::Debug for StaticBotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticBotToken(..)")
    }
}

#[async_trait]
impl BotAuthenticator for StaticBotToken {
    async fn token(&self, retry: bool) -> Result<String, LoginError> {
        if retry {
            return Err(LoginError::Cancelled);
        }
        Ok(self.0.clone())
    }
}

/// Credential collaborators for one login attempt.
#[derive(Clone)]
pub enum LoginDetails {
    User(Arc<dyn UserAuthenticator>),
    Bot(Arc<dyn BotAuthenticator>),
}

impl LoginDetails {
    #[must_use]
    pub fn user(authenticator: impl UserAuthenticator + 'static) -> Self {
        Self::User(Arc::new(authenticator))
    }

    #[must_use]
    pub fn bot(authenticator: impl BotAuthenticator + 'static) -> Self {
        Self::Bot(Arc::new(authenticator))
    }

    /// Log in as a bot with a fixed token.
    #[must_use]
    pub fn bot_token(token: impl Into<String>) -> Self {
        Self::bot(StaticBotToken(token.into()))
    }

    #[must_use]
    pub const fn is_bot(&self) -> bool {
        matches!(self, Self::Bot(_))
    }
}

impl fmt::Debug for LoginDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(_) => f.write_str("LoginDetails::User"),
            Self::Bot(_) => f.write_str("LoginDetails::Bot"),
        }
    }
}
