//! Shared fixtures for handler tests: an engine over the in-memory store
//! with an email sender that captures outgoing codes.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::email::{EmailMessage, EmailSender};
use crate::otp::rate_limit::{NoopRateLimiter, RateLimiter};
use crate::otp::{MemoryOtpStore, OtpConfig, OtpEngine};

pub(crate) struct CapturingEmailSender {
    messages: Mutex<Vec<EmailMessage>>,
}

impl CapturingEmailSender {
    pub(crate) fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn last_code(&self) -> String {
        let messages = self.messages.lock().await;
        let message = messages.last().expect("at least one email sent");
        let payload: serde_json::Value =
            serde_json::from_str(&message.payload_json).expect("payload is JSON");
        payload
            .get("code")
            .and_then(|value| value.as_str())
            .expect("payload carries code")
            .to_string()
    }
}

#[async_trait]
impl EmailSender for CapturingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.messages.lock().await.push(message.clone());
        Ok(())
    }
}

pub(crate) struct TestHarness {
    pub(crate) engine: Arc<OtpEngine>,
    pub(crate) sender: Arc<CapturingEmailSender>,
    pub(crate) limiter: Arc<dyn RateLimiter>,
}

pub(crate) fn harness() -> TestHarness {
    harness_with(OtpConfig::new())
}

pub(crate) fn harness_with(config: OtpConfig) -> TestHarness {
    let sender = Arc::new(CapturingEmailSender::new());
    let engine = Arc::new(OtpEngine::new(
        Arc::new(MemoryOtpStore::new()),
        sender.clone(),
        SecretString::from("handler-test-secret".to_string()),
        config,
    ));
    TestHarness {
        engine,
        sender,
        limiter: Arc::new(NoopRateLimiter),
    }
}
