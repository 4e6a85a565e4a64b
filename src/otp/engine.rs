//! Issue/verify/resend orchestration over the record store and the email
//! channel.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::sync::Arc;

use crate::email::{EmailMessage, EmailSender};

use super::code::{generate_code, generate_salt, hash_code, verify_code};
use super::models::{
    AccountOutcome, AttemptOutcome, ConsumeOutcome, NewOtpRecord, RegistrationProfile,
};
use super::store::OtpStore;

const DEFAULT_TTL_SECONDS: i64 = 300;
const DEFAULT_ATTEMPT_CAP: i32 = 5;
const DEFAULT_ISSUANCE_WINDOW_SECONDS: i64 = 300;
const DEFAULT_ISSUANCE_WINDOW_MAX: i64 = 3;
const DEFAULT_PURGE_INTERVAL_SECONDS: u64 = 60;

/// Engine policy knobs. One TTL constant drives issuance, verification,
/// the HTTP `expires_in` response, and the client countdown.
#[derive(Clone, Copy, Debug)]
pub struct OtpConfig {
    ttl_seconds: i64,
    attempt_cap: i32,
    issuance_window_seconds: i64,
    issuance_window_max: i64,
    purge_interval_seconds: u64,
}

impl OtpConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            attempt_cap: DEFAULT_ATTEMPT_CAP,
            issuance_window_seconds: DEFAULT_ISSUANCE_WINDOW_SECONDS,
            issuance_window_max: DEFAULT_ISSUANCE_WINDOW_MAX,
            purge_interval_seconds: DEFAULT_PURGE_INTERVAL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_attempt_cap(mut self, cap: i32) -> Self {
        self.attempt_cap = cap;
        self
    }

    #[must_use]
    pub fn with_issuance_window(mut self, seconds: i64, max: i64) -> Self {
        self.issuance_window_seconds = seconds;
        self.issuance_window_max = max;
        self
    }

    #[must_use]
    pub fn with_purge_interval_seconds(mut self, seconds: u64) -> Self {
        self.purge_interval_seconds = seconds;
        self
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    #[must_use]
    pub fn attempt_cap(&self) -> i32 {
        self.attempt_cap
    }

    #[must_use]
    pub fn issuance_window_seconds(&self) -> i64 {
        self.issuance_window_seconds
    }

    #[must_use]
    pub fn issuance_window_max(&self) -> i64 {
        self.issuance_window_max
    }

    #[must_use]
    pub fn purge_interval_seconds(&self) -> u64 {
        self.purge_interval_seconds
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A successful issuance. `expires_in` is server-computed so clients never
/// assume the TTL.
#[derive(Debug, Clone)]
pub struct Issued {
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

/// A successful verification, carrying the profile context handed off to
/// account creation.
#[derive(Debug, Clone)]
pub struct Verified {
    pub contact: String,
    pub profile: RegistrationProfile,
    pub account: AccountOutcome,
}

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("issuance rate limited for this contact")]
    RateLimited { retry_after_seconds: i64 },
    #[error("email delivery failed: {0}")]
    EmailDelivery(anyhow::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("no code has been issued for this contact")]
    NotFound,
    #[error("code already used")]
    AlreadyUsed,
    #[error("code expired")]
    Expired,
    #[error("too many attempts")]
    TooManyAttempts,
    #[error("invalid code, {attempts_remaining} attempts remaining")]
    InvalidCode { attempts_remaining: i32 },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ResendError {
    #[error("no pending registration for this contact")]
    NoPendingRegistration,
    #[error("resend rate limited for this contact")]
    RateLimited { retry_after_seconds: i64 },
    #[error("email delivery failed: {0}")]
    EmailDelivery(anyhow::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct OtpEngine {
    store: Arc<dyn OtpStore>,
    sender: Arc<dyn EmailSender>,
    secret: SecretString,
    config: OtpConfig,
}

impl OtpEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn OtpStore>,
        sender: Arc<dyn EmailSender>,
        secret: SecretString,
        config: OtpConfig,
    ) -> Self {
        Self {
            store,
            sender,
            secret,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn OtpStore {
        self.store.as_ref()
    }

    /// Issue a fresh code for `contact` and email it.
    ///
    /// The record is persisted before the send, so a failed delivery still
    /// leaves a valid record behind for resend recovery.
    ///
    /// # Errors
    /// `RateLimited` when the per-contact window is exhausted (no record
    /// is created, no email is sent), `EmailDelivery` when the persist
    /// succeeded but the send failed, `Store` on infrastructure failures.
    pub async fn issue(
        &self,
        contact: &str,
        profile: RegistrationProfile,
    ) -> Result<Issued, IssueError> {
        let now = Utc::now();
        if let Some(retry_after_seconds) = self.window_exhausted(contact, now).await? {
            return Err(IssueError::RateLimited {
                retry_after_seconds,
            });
        }

        self.store
            .upsert_pending_registration(contact, &profile)
            .await?;

        self.create_and_send(contact, now)
            .await
            .map_err(|err| match err {
                CreateSendError::Email(err) => IssueError::EmailDelivery(err),
                CreateSendError::Store(err) => IssueError::Store(err),
            })
    }

    /// Verify a candidate code against the newest record for `contact`.
    ///
    /// Checks run in a fixed order: existence, consumption, expiry,
    /// attempt cap, then the constant-time hash comparison. The cap check
    /// happens before any hashing and holds on every call once a record is
    /// locked.
    ///
    /// # Errors
    /// One distinct variant per failure; callers must not coalesce them.
    pub async fn verify(&self, contact: &str, candidate: &str) -> Result<Verified, VerifyError> {
        let now = Utc::now();
        let record = self
            .store
            .latest_record(contact)
            .await?
            .ok_or(VerifyError::NotFound)?;

        if record.consumed() {
            return Err(VerifyError::AlreadyUsed);
        }
        if record.expired(now) {
            return Err(VerifyError::Expired);
        }
        let cap = self.config.attempt_cap;
        if record.attempts >= cap {
            return Err(VerifyError::TooManyAttempts);
        }

        let matches = verify_code(
            self.secret.expose_secret().as_bytes(),
            candidate,
            &record.salt,
            &record.code_hash,
        )?;

        if !matches {
            return Err(match self.store.register_failed_attempt(record.id, cap).await? {
                AttemptOutcome::Incremented { attempts } if attempts >= cap => {
                    VerifyError::TooManyAttempts
                }
                AttemptOutcome::Incremented { attempts } => VerifyError::InvalidCode {
                    attempts_remaining: cap - attempts,
                },
                AttemptOutcome::Capped => VerifyError::TooManyAttempts,
            });
        }

        match self.store.consume(record.id).await? {
            ConsumeOutcome::Consumed => {}
            // A concurrent request won the consume race.
            ConsumeOutcome::AlreadyConsumed => return Err(VerifyError::AlreadyUsed),
        }

        let profile = self
            .store
            .pending_registration(contact)
            .await?
            .unwrap_or_default();
        let account = self.store.create_user_account(contact, &profile).await?;

        Ok(Verified {
            contact: contact.to_string(),
            profile,
            account,
        })
    }

    /// Re-issue a code for an already-pending registration.
    ///
    /// Expired records are fine (resend is the recovery path from
    /// expiry); a fresh record resets the effective attempt budget via
    /// newest-record-wins.
    ///
    /// # Errors
    /// `NoPendingRegistration` when the contact never started a
    /// registration, `RateLimited` when the per-contact window is
    /// exhausted, `EmailDelivery`/`Store` as for [`Self::issue`].
    pub async fn resend(&self, contact: &str) -> Result<Issued, ResendError> {
        if self.store.pending_registration(contact).await?.is_none() {
            return Err(ResendError::NoPendingRegistration);
        }

        let now = Utc::now();
        if let Some(retry_after_seconds) = self.window_exhausted(contact, now).await? {
            return Err(ResendError::RateLimited {
                retry_after_seconds,
            });
        }

        self.create_and_send(contact, now)
            .await
            .map_err(|err| match err {
                CreateSendError::Email(err) => ResendError::EmailDelivery(err),
                CreateSendError::Store(err) => ResendError::Store(err),
            })
    }

    /// Some(retry-after seconds) when the contact has used up its
    /// issuance window.
    async fn window_exhausted(&self, contact: &str, now: DateTime<Utc>) -> Result<Option<i64>> {
        let window = Duration::seconds(self.config.issuance_window_seconds);
        let activity = self.store.issuance_activity(contact, now - window).await?;
        if activity.count < self.config.issuance_window_max {
            return Ok(None);
        }
        let retry_after = activity
            .oldest
            .map_or(self.config.issuance_window_seconds, |oldest| {
                (oldest + window - now).num_seconds()
            });
        Ok(Some(retry_after.max(1)))
    }

    async fn create_and_send(
        &self,
        contact: &str,
        now: DateTime<Utc>,
    ) -> Result<Issued, CreateSendError> {
        let code = generate_code();
        let salt = generate_salt().map_err(CreateSendError::Store)?;
        let code_hash = hash_code(self.secret.expose_secret().as_bytes(), &code, &salt)
            .map_err(CreateSendError::Store)?;
        let expires_at = now + Duration::seconds(self.config.ttl_seconds);

        // Persist-then-send: a crash between the two steps leaves
        // "record, no email", recoverable by resend. Never the reverse.
        self.store
            .insert_record(NewOtpRecord {
                contact: contact.to_string(),
                code_hash,
                salt,
                expires_at,
            })
            .await
            .map_err(CreateSendError::Store)?;

        let expires_in = self.config.ttl_seconds;
        let payload = json!({
            "code": code,
            "expires_in": expires_in,
        });
        let message = EmailMessage {
            to_email: contact.to_string(),
            template: "otp_code".to_string(),
            payload_json: payload.to_string(),
        };
        self.sender
            .send(&message)
            .await
            .map_err(CreateSendError::Email)?;

        Ok(Issued {
            expires_at,
            expires_in,
        })
    }
}

enum CreateSendError {
    Email(anyhow::Error),
    Store(anyhow::Error),
}
