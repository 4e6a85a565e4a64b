//! Email delivery channel for plaintext codes.
//!
//! Delivery is a per-request step after the record is persisted; a failed
//! send surfaces to the caller but never touches the stored record, so the
//! contact can recover through resend.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;
use url::Url;

use crate::APP_USER_AGENT;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Development fallback: log the message instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}

/// Transactional-email provider reached over HTTP.
#[derive(Clone, Debug)]
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: Url,
    token: SecretString,
}

impl HttpEmailSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoint: Url, token: SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build email http client")?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let payload: serde_json::Value = serde_json::from_str(&message.payload_json)
            .context("email payload is not valid JSON")?;
        let body = serde_json::json!({
            "to": message.to_email,
            "template": message.template,
            "payload": payload,
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .context("email provider request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("email provider returned {status}"));
        }
        Ok(())
    }
}
