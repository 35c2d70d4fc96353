//! Authentication: credential collaborators and the authorization state machine.

pub mod login;
pub(crate) mod machine;

pub use login::{BotAuthenticator, LoginDetails, RegistrationName, StaticBotToken, UserAuthenticator};
