//! In-process engine and credential doubles for tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Value, json};
use td_session_core::{
    ClientOptions, Engine, EngineError, EngineHandle, FatalErrorCallback, LoginError, Message,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::auth::{RegistrationName, UserAuthenticator};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine fed by a [`Remote`].
pub struct MockEngine {
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Message, String>>>,
    sent: mpsc::UnboundedSender<Message>,
    executed: Mutex<Vec<Message>>,
    destroyed: Mutex<Vec<EngineHandle>>,
    next_handle: AtomicU64,
    fail_create: AtomicBool,
    fatal_callback: Mutex<Option<FatalErrorCallback>>,
    receiving: AtomicBool,
    released_mid_receive: AtomicBool,
    used_after_release: AtomicBool,
}

impl MockEngine {
    pub fn fail_next_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn executed_kinds(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| m.kind().map(str::to_string))
            .collect()
    }

    pub fn destroyed(&self) -> Vec<EngineHandle> {
        self.destroyed.lock().unwrap().clone()
    }

    /// Wait until at least one handle was released.
    pub async fn wait_destroyed(&self) -> Vec<EngineHandle> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let destroyed = self.destroyed();
                if !destroyed.is_empty() {
                    return destroyed;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for engine release")
    }

    pub fn has_fatal_callback(&self) -> bool {
        self.fatal_callback.lock().unwrap().is_some()
    }

    /// `destroy` ran while a `receive` was in progress.
    pub fn released_mid_receive(&self) -> bool {
        self.released_mid_receive.load(Ordering::SeqCst)
    }

    /// `send` or `receive` was called with an already released handle.
    pub fn used_after_release(&self) -> bool {
        self.used_after_release.load(Ordering::SeqCst)
    }

    fn check_live(&self, handle: EngineHandle) {
        if self.destroyed.lock().unwrap().contains(&handle) {
            self.used_after_release.store(true, Ordering::SeqCst);
        }
    }

    async fn next_inbound(&self, timeout: Duration) -> Result<Option<Message>, EngineError> {
        let mut inbox = self.inbox.lock().await;
        match tokio::time::timeout(timeout, inbox.recv()).await {
            Ok(Some(Ok(message))) => Ok(Some(message)),
            Ok(Some(Err(reason))) => Err(EngineError::Receive(reason)),
            Ok(None) => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn create(&self) -> Result<EngineHandle, EngineError> {
        if self.fail_create.swap(false, Ordering::SeqCst) {
            return Err(EngineError::CreateFailed("mock refused".to_string()));
        }
        Ok(EngineHandle::from_raw(
            self.next_handle.fetch_add(1, Ordering::SeqCst),
        ))
    }

    fn send(&self, handle: EngineHandle, message: &Message) {
        self.check_live(handle);
        let _ = self.sent.send(message.clone());
    }

    async fn receive(
        &self,
        handle: EngineHandle,
        timeout: Duration,
    ) -> Result<Option<Message>, EngineError> {
        self.check_live(handle);
        self.receiving.store(true, Ordering::SeqCst);
        let received = self.next_inbound(timeout).await;
        self.receiving.store(false, Ordering::SeqCst);
        received
    }

    fn execute(
        &self,
        _handle: Option<EngineHandle>,
        message: &Message,
    ) -> Result<Option<Message>, EngineError> {
        self.executed.lock().unwrap().push(message.clone());
        Ok(Some(Message::from_value(json!({"@type": "ok"})).unwrap()))
    }

    fn destroy(&self, handle: EngineHandle) {
        if self.receiving.load(Ordering::SeqCst) {
            self.released_mid_receive.store(true, Ordering::SeqCst);
        }
        self.destroyed.lock().unwrap().push(handle);
    }

    fn set_log_fatal_error_callback(&self, callback: Option<FatalErrorCallback>) {
        *self.fatal_callback.lock().unwrap() = callback;
    }
}

/// The far side of a [`MockEngine`].
pub struct Remote {
    inbox: mpsc::UnboundedSender<Result<Message, String>>,
    sent: mpsc::UnboundedReceiver<Message>,
}

impl Remote {
    /// Queue a message for the session to receive.
    pub fn push(&self, value: Value) {
        self.inbox
            .send(Ok(Message::from_value(value).unwrap()))
            .unwrap();
    }

    /// Make the next receive fail.
    pub fn push_failure(&self, reason: &str) {
        self.inbox.send(Err(reason.to_string())).unwrap();
    }

    /// Next message the session sent.
    pub async fn next_sent(&mut self) -> Message {
        tokio::time::timeout(Duration::from_secs(2), self.sent.recv())
            .await
            .expect("timed out waiting for a sent message")
            .expect("engine dropped")
    }

    pub fn try_next_sent(&mut self) -> Option<Message> {
        self.sent.try_recv().ok()
    }
}

pub fn mock_engine() -> (Arc<MockEngine>, Remote) {
    init_tracing();
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let engine = Arc::new(MockEngine {
        inbox: tokio::sync::Mutex::new(inbox_rx),
        sent: sent_tx,
        executed: Mutex::default(),
        destroyed: Mutex::default(),
        next_handle: AtomicU64::new(1),
        fail_create: AtomicBool::new(false),
        fatal_callback: Mutex::new(None),
        receiving: AtomicBool::new(false),
        released_mid_receive: AtomicBool::new(false),
        used_after_release: AtomicBool::new(false),
    });
    let remote = Remote {
        inbox: inbox_tx,
        sent: sent_rx,
    };
    (engine, remote)
}

pub fn test_options() -> ClientOptions {
    ClientOptions::new(2040, "b18441a1ff607e10a989891a5462e627")
        .with_receive_timeout(Duration::from_millis(20))
}

pub fn auth_state(state: &str) -> Value {
    json!({
        "@type": "updateAuthorizationState",
        "authorization_state": {"@type": state},
    })
}

pub fn version_option(version: &str) -> Value {
    json!({
        "@type": "updateOption",
        "name": "version",
        "value": {"@type": "optionValueString", "value": version},
    })
}

#[derive(Default)]
struct Recorded {
    prompts: Vec<(&'static str, bool)>,
    hints: Vec<String>,
    links: Vec<String>,
}

/// User authenticator that answers every prompt and records the calls.
#[derive(Clone, Default)]
pub struct RecordingUser {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingUser {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, prompt: &'static str, retry: bool) {
        self.recorded.lock().unwrap().prompts.push((prompt, retry));
    }

    pub fn prompts(&self) -> Vec<(&'static str, bool)> {
        self.recorded.lock().unwrap().prompts.clone()
    }

    pub fn hints(&self) -> Vec<String> {
        self.recorded.lock().unwrap().hints.clone()
    }

    pub fn links(&self) -> Vec<String> {
        self.recorded.lock().unwrap().links.clone()
    }
}

#[async_trait]
impl UserAuthenticator for RecordingUser {
    async fn phone_number(&self, retry: bool) -> Result<String, LoginError> {
        self.record("phone_number", retry);
        Ok("+10000000000".to_string())
    }

    async fn auth_code(&self, retry: bool) -> Result<String, LoginError> {
        self.record("auth_code", retry);
        Ok("22222".to_string())
    }

    async fn password(&self, hint: &str, retry: bool) -> Result<String, LoginError> {
        self.record("password", retry);
        self.recorded.lock().unwrap().hints.push(hint.to_string());
        Ok("hunter2".to_string())
    }

    async fn email_address(&self) -> Result<String, LoginError> {
        Ok("user@example.com".to_string())
    }

    async fn email_code(&self) -> Result<String, LoginError> {
        Ok("33333".to_string())
    }

    async fn registration_name(&self) -> Result<RegistrationName, LoginError> {
        Ok(RegistrationName {
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
        })
    }

    async fn confirm_on_another_device(&self, link: &str) {
        self.recorded.lock().unwrap().links.push(link.to_string());
    }
}
