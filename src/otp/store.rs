//! The record-store seam the engine is built against.
//!
//! The store owns serialization of the `attempts`/`consumed_at`
//! read-modify-write: implementations must apply those as conditional
//! updates, not read-then-write, so concurrent verification attempts for
//! the same contact cannot race.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{
    AccountOutcome, AttemptOutcome, ConsumeOutcome, IssuanceActivity, NewOtpRecord, OtpRecord,
    RegistrationProfile,
};

#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Persist a new record; the store assigns `id` and `created_at`.
    async fn insert_record(&self, record: NewOtpRecord) -> Result<OtpRecord>;

    /// The newest record for a contact, if any. Older records are shadowed
    /// and never consulted by verification.
    async fn latest_record(&self, contact: &str) -> Result<Option<OtpRecord>>;

    /// How many records were created for the contact since `since`, and
    /// when the oldest of them was created.
    async fn issuance_activity(&self, contact: &str, since: DateTime<Utc>)
        -> Result<IssuanceActivity>;

    /// Increment `attempts` if and only if the record is unconsumed and
    /// still under `cap`. Atomic with respect to concurrent calls.
    async fn register_failed_attempt(&self, id: Uuid, cap: i32) -> Result<AttemptOutcome>;

    /// Mark the record consumed if and only if it is not already. Atomic
    /// with respect to concurrent calls.
    async fn consume(&self, id: Uuid) -> Result<ConsumeOutcome>;

    /// Create or refresh the profile context held between issue and verify.
    async fn upsert_pending_registration(
        &self,
        contact: &str,
        profile: &RegistrationProfile,
    ) -> Result<()>;

    /// The profile context for a contact, if a registration is pending.
    async fn pending_registration(&self, contact: &str) -> Result<Option<RegistrationProfile>>;

    /// Account-creation handoff once verification succeeds. Each email is
    /// created exactly once.
    async fn create_user_account(
        &self,
        contact: &str,
        profile: &RegistrationProfile,
    ) -> Result<AccountOutcome>;

    /// Opportunistic housekeeping: delete records that expired before
    /// `cutoff`. Correctness never depends on this (newest-wins shadows
    /// stale rows); returns the number of rows removed.
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
