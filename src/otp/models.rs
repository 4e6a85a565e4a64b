//! Persistence-facing types for the OTP record store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A persisted one-time passcode record.
///
/// `code_hash` is the hex-encoded HMAC of `code || salt`; the plaintext
/// code only ever travels over the email channel. A record is live while
/// `consumed_at` is unset, `expires_at` is in the future, and `attempts`
/// is under the configured cap.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OtpRecord {
    pub id: Uuid,
    pub contact: String,
    pub code_hash: String,
    pub salt: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl OtpRecord {
    #[must_use]
    pub fn consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    #[must_use]
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Fields the issuer provides for a new record; the store assigns id and
/// `created_at`.
#[derive(Debug, Clone)]
pub struct NewOtpRecord {
    pub contact: String,
    pub code_hash: String,
    pub salt: String,
    pub expires_at: DateTime<Utc>,
}

/// Profile fields submitted alongside a registration request.
///
/// A closed set of named optional fields rather than an open property bag,
/// so the engine's contract stays stable independent of which fields a
/// particular form collects.
#[derive(ToSchema, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// ISO-8601 date (`YYYY-MM-DD`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Result of the conditional `attempts` increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The increment applied; `attempts` is the new value.
    Incremented { attempts: i32 },
    /// No row qualified: the record was already at the cap or consumed.
    Capped,
}

/// Result of the conditional consume update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Consumed,
    /// Another request consumed the record first.
    AlreadyConsumed,
}

/// Result of the account-creation handoff after successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountOutcome {
    Created,
    AlreadyExists,
}

/// Per-contact issuance counters over a time window, used for the
/// resend/issuance rate limit.
#[derive(Debug, Clone, Copy)]
pub struct IssuanceActivity {
    pub count: i64,
    pub oldest: Option<DateTime<Utc>>,
}
