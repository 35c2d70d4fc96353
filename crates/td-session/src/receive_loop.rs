//! Background loop pulling messages from the engine.

use std::sync::Arc;

use td_session_core::{Message, SessionError, SessionEvent};
use tokio::sync::watch;

use crate::{
    auth::machine::AuthMachine,
    protocol::PrivilegedUpdate,
    router::{Route, Router, UpdateDisposition},
    session::SessionInner,
};

/// Loop-owned state. Nothing outside the loop touches it.
struct LoopContext {
    router: Router,
    auth: AuthMachine,
}

/// Start the receive loop for a freshly created engine instance.
pub(crate) fn spawn(session: Arc<SessionInner>) {
    tokio::spawn(async move {
        run(&session).await;
    });
}

async fn run(session: &SessionInner) {
    let mut paused = session.signals().subscribe_paused();
    let mut destroyed = session.signals().subscribe_destroyed();
    let mut ctx = LoopContext {
        router: Router::new(session.options().skip_old_updates),
        auth: AuthMachine::new(session.signals()),
    };
    let timeout = session.options().receive_timeout;

    tracing::debug!("receive loop started");
    loop {
        let is_paused = *paused.borrow_and_update();
        if is_paused && !wait_for_resume(&mut paused, &mut destroyed).await {
            break;
        }
        let Some(handle) = session.begin_receive() else {
            break;
        };
        let received = session.engine().receive(handle, timeout).await;
        if !session.end_receive(handle) {
            break;
        }
        let result = match received {
            Ok(Some(message)) => handle_message(session, &mut ctx, message).await,
            Ok(None) => Ok(()),
            Err(e) => Err(SessionError::Engine(e)),
        };

        if let Err(e) = result {
            if session.signals().is_destroyed() {
                break;
            }
            tracing::error!("receive loop error: {e}");
            session.publish(SessionEvent::error(e));
        }
    }
    tracing::debug!("receive loop stopped");
}

/// Park until resumed; `false` if the session was destroyed meanwhile.
async fn wait_for_resume(
    paused: &mut watch::Receiver<bool>,
    destroyed: &mut watch::Receiver<bool>,
) -> bool {
    tracing::debug!("receive loop paused");
    tokio::select! {
        resumed = paused.wait_for(|paused| !*paused) => resumed.is_ok(),
        _ = destroyed.wait_for(|destroyed| *destroyed) => false,
    }
}

async fn handle_message(
    session: &SessionInner,
    ctx: &mut LoopContext,
    message: Message,
) -> Result<(), SessionError> {
    session.publish(SessionEvent::Response(message.clone()));

    match ctx.router.classify(message, session.pending()) {
        Route::Delivered => Ok(()),
        Route::AuthError(error) => ctx.auth.on_error(session, error).await,
        Route::Uncorrelated(error) => {
            tracing::warn!(code = error.code, message = %error.message, "uncorrelated engine error");
            session.publish(SessionEvent::error(error));
            Ok(())
        }
        Route::Update(update) => match ctx.router.filter_update(&update) {
            UpdateDisposition::Suppress => Ok(()),
            UpdateDisposition::Publish => {
                session.publish(SessionEvent::Update(update));
                Ok(())
            }
            UpdateDisposition::Privileged(privileged) => {
                session.publish(SessionEvent::Update(update));
                apply_privileged(session, ctx, privileged).await
            }
        },
    }
}

async fn apply_privileged(
    session: &SessionInner,
    ctx: &mut LoopContext,
    update: PrivilegedUpdate,
) -> Result<(), SessionError> {
    if let Some(version) = update.engine_version() {
        ctx.auth.set_version(version);
    }
    match update {
        PrivilegedUpdate::UpdateAuthorizationState {
            authorization_state,
        } => ctx.auth.on_state(session, authorization_state).await,
        PrivilegedUpdate::UpdateOption { .. } | PrivilegedUpdate::UpdateConnectionState { .. } => {
            Ok(())
        }
    }
}
