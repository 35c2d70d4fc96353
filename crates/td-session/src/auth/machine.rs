//! Authorization state machine.
//!
//! Driven exclusively by engine-reported `updateAuthorizationState`
//! notifications and by errors answering the requests it sent. It never sets
//! a state speculatively.

use td_session_core::{EngineVersion, LoginError, RemoteError, SessionError, SessionEvent};
use tokio::sync::watch;

use super::login::LoginDetails;
use crate::{
    protocol::{AuthorizationState, EmailAddressAuthentication, SessionRequest},
    session::SessionInner,
    state::SessionSignals,
};

/// Authorization state machine, owned by the receive loop.
pub(crate) struct AuthMachine {
    auth_needed: bool,
    version: Option<EngineVersion>,
    password_hint: String,
    login_details: watch::Receiver<Option<LoginDetails>>,
    destroyed: watch::Receiver<bool>,
}

impl AuthMachine {
    pub(crate) fn new(signals: &SessionSignals) -> Self {
        Self {
            auth_needed: false,
            version: None,
            password_hint: String::new(),
            login_details: signals.subscribe_login_details(),
            destroyed: signals.subscribe_destroyed(),
        }
    }

    pub(crate) fn set_version(&mut self, version: EngineVersion) {
        tracing::debug!(%version, "engine version reported");
        self.version = Some(version);
    }

    /// React to a new authorization state.
    pub(crate) async fn on_state(
        &mut self,
        session: &SessionInner,
        state: AuthorizationState,
    ) -> Result<(), SessionError> {
        tracing::debug!(?state, "authorization state changed");
        match state {
            AuthorizationState::WaitTdlibParameters => {
                let request = SessionRequest::tdlib_parameters(session.options(), self.version);
                session.send_internal(&request)?;
                tracing::info!("session connected");
                session.connect_gate().resolve(());
            }
            AuthorizationState::WaitEncryptionKey { .. } => {
                session.send_internal(&SessionRequest::CheckDatabaseEncryptionKey {
                    encryption_key: session.options().database_encryption_key.clone(),
                })?;
                tracing::info!("session connected");
                session.connect_gate().resolve(());
            }
            AuthorizationState::Ready => {
                if !self.auth_needed {
                    session.publish(SessionEvent::AuthNotNeeded);
                }
                tracing::info!("session authorized");
                session.login_gate().resolve(());
            }
            AuthorizationState::Closed => {
                session.connect_gate().reject(SessionError::AuthorizationClosed);
                session.login_gate().reject(SessionError::AuthorizationClosed);
                session.destroy();
            }
            AuthorizationState::LoggingOut
            | AuthorizationState::Closing
            | AuthorizationState::Unknown => {}
            state => {
                if !self.auth_needed {
                    self.auth_needed = true;
                    session.publish(SessionEvent::AuthNeeded);
                }
                let Some(details) = self.wait_for_login_details().await else {
                    return Ok(());
                };
                let answered = self.answer(session, &details, state).await;
                return settle_login_failure(session, answered);
            }
        }
        Ok(())
    }

    /// React to an error answering a request the machine sent.
    pub(crate) async fn on_error(
        &mut self,
        session: &SessionInner,
        error: RemoteError,
    ) -> Result<(), SessionError> {
        let details = self.login_details.borrow().clone();
        let retried = self.retry(session, details.as_ref(), &error).await;
        match retried {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(code = error.code, message = %error.message, "authorization error");
                session.publish(SessionEvent::error(error));
                Ok(())
            }
            Err(e) => settle_login_failure(session, Err(e)),
        }
    }

    async fn wait_for_login_details(&mut self) -> Option<LoginDetails> {
        tokio::select! {
            details = self.login_details.wait_for(Option::is_some) => {
                details.ok().and_then(|details| details.clone())
            }
            _ = self.destroyed.wait_for(|destroyed| *destroyed) => None,
        }
    }

    async fn answer(
        &mut self,
        session: &SessionInner,
        details: &LoginDetails,
        state: AuthorizationState,
    ) -> Result<(), SessionError> {
        let request = match (state, details) {
            (AuthorizationState::WaitPhoneNumber, LoginDetails::User(user)) => {
                SessionRequest::SetAuthenticationPhoneNumber {
                    phone_number: user.phone_number(false).await?,
                }
            }
            (AuthorizationState::WaitPhoneNumber, LoginDetails::Bot(bot)) => {
                SessionRequest::CheckAuthenticationBotToken {
                    token: bot.token(false).await?,
                }
            }
            (AuthorizationState::WaitEmailAddress, LoginDetails::User(user)) => {
                SessionRequest::SetAuthenticationEmailAddress {
                    email_address: user.email_address().await?,
                }
            }
            (AuthorizationState::WaitEmailCode, LoginDetails::User(user)) => {
                SessionRequest::CheckAuthenticationEmailCode {
                    code: EmailAddressAuthentication::EmailAddressAuthenticationCode {
                        code: user.email_code().await?,
                    },
                }
            }
            (AuthorizationState::WaitOtherDeviceConfirmation { link }, LoginDetails::User(user)) => {
                user.confirm_on_another_device(&link).await;
                return Ok(());
            }
            (AuthorizationState::WaitCode, LoginDetails::User(user)) => {
                SessionRequest::CheckAuthenticationCode {
                    code: user.auth_code(false).await?,
                }
            }
            (AuthorizationState::WaitRegistration, LoginDetails::User(user)) => {
                let name = user.registration_name().await?;
                SessionRequest::RegisterUser {
                    first_name: name.first_name,
                    last_name: name.last_name,
                }
            }
            (AuthorizationState::WaitPassword { password_hint }, LoginDetails::User(user)) => {
                self.password_hint = password_hint;
                SessionRequest::CheckAuthenticationPassword {
                    password: user.password(&self.password_hint, false).await?,
                }
            }
            (state, LoginDetails::Bot(_)) => {
                tracing::warn!(?state, "bot login cannot satisfy user authorization state");
                return Err(LoginError::Unsupported("user authorization step in bot login").into());
            }
            (state, LoginDetails::User(_)) => {
                tracing::debug!(?state, "no credential needed");
                return Ok(());
            }
        };
        session.send_internal(&request)
    }

    /// Re-prompt and resend for a rejected credential.
    ///
    /// Returns `false` if the error is not one the login flow can correct.
    async fn retry(
        &self,
        session: &SessionInner,
        details: Option<&LoginDetails>,
        error: &RemoteError,
    ) -> Result<bool, SessionError> {
        let request = match (details, error.message.as_str()) {
            (Some(LoginDetails::User(user)), "PHONE_CODE_EMPTY" | "PHONE_CODE_INVALID") => {
                SessionRequest::CheckAuthenticationCode {
                    code: user.auth_code(true).await?,
                }
            }
            (Some(LoginDetails::User(user)), "PHONE_NUMBER_INVALID") => {
                SessionRequest::SetAuthenticationPhoneNumber {
                    phone_number: user.phone_number(true).await?,
                }
            }
            (Some(LoginDetails::User(user)), "PASSWORD_HASH_INVALID") => {
                SessionRequest::CheckAuthenticationPassword {
                    password: user.password(&self.password_hint, true).await?,
                }
            }
            (Some(LoginDetails::Bot(bot)), "ACCESS_TOKEN_INVALID" | "ACCESS_TOKEN_REQUIRED") => {
                SessionRequest::CheckAuthenticationBotToken {
                    token: bot.token(true).await?,
                }
            }
            _ => return Ok(false),
        };
        tracing::warn!(
            message = %error.message,
            request = request.kind(),
            "login step rejected, prompting again"
        );
        session.send_internal(&request)?;
        Ok(true)
    }
}

/// A failing credential prompt belongs to the pending login, not the
/// general error channel.
fn settle_login_failure(
    session: &SessionInner,
    result: Result<(), SessionError>,
) -> Result<(), SessionError> {
    match result {
        Err(SessionError::Login(e)) => {
            tracing::warn!("login prompt failed: {e}");
            session.login_gate().reject(SessionError::Login(e));
            Ok(())
        }
        other => other,
    }
}
