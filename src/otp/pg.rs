//! Postgres-backed record store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::models::{
    AccountOutcome, AttemptOutcome, ConsumeOutcome, IssuanceActivity, NewOtpRecord, OtpRecord,
    RegistrationProfile,
};
use super::store::OtpStore;

#[derive(Clone, Debug)]
pub struct PgOtpStore {
    pool: PgPool,
}

impl PgOtpStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    async fn insert_record(&self, record: NewOtpRecord) -> Result<OtpRecord> {
        let query = r"
            INSERT INTO otp_codes (contact, code_hash, salt, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, contact, code_hash, salt, attempts, created_at, expires_at, consumed_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query_as::<_, OtpRecord>(query)
            .bind(&record.contact)
            .bind(&record.code_hash)
            .bind(&record.salt)
            .bind(record.expires_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert otp record")
    }

    async fn latest_record(&self, contact: &str) -> Result<Option<OtpRecord>> {
        let query = r"
            SELECT id, contact, code_hash, salt, attempts, created_at, expires_at, consumed_at
            FROM otp_codes
            WHERE contact = $1
            ORDER BY created_at DESC
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, OtpRecord>(query)
            .bind(contact)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch latest otp record")
    }

    async fn issuance_activity(
        &self,
        contact: &str,
        since: DateTime<Utc>,
    ) -> Result<IssuanceActivity> {
        let query = r"
            SELECT COUNT(*) AS total, MIN(created_at) AS oldest
            FROM otp_codes
            WHERE contact = $1
              AND created_at > $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(contact)
            .bind(since)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count otp issuance activity")?;

        Ok(IssuanceActivity {
            count: row.get("total"),
            oldest: row.get("oldest"),
        })
    }

    async fn register_failed_attempt(&self, id: Uuid, cap: i32) -> Result<AttemptOutcome> {
        // Conditional increment: no row qualifies once the cap is reached
        // or the record is consumed, so concurrent attempts cannot push
        // `attempts` past the cap.
        let query = r"
            UPDATE otp_codes
            SET attempts = attempts + 1
            WHERE id = $1
              AND attempts < $2
              AND consumed_at IS NULL
            RETURNING attempts
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .bind(cap)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to register otp attempt")?;

        Ok(match row {
            Some(row) => AttemptOutcome::Incremented {
                attempts: row.get("attempts"),
            },
            None => AttemptOutcome::Capped,
        })
    }

    async fn consume(&self, id: Uuid) -> Result<ConsumeOutcome> {
        let query = r"
            UPDATE otp_codes
            SET consumed_at = NOW()
            WHERE id = $1
              AND consumed_at IS NULL
            RETURNING id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume otp record")?;

        Ok(if row.is_some() {
            ConsumeOutcome::Consumed
        } else {
            ConsumeOutcome::AlreadyConsumed
        })
    }

    async fn upsert_pending_registration(
        &self,
        contact: &str,
        profile: &RegistrationProfile,
    ) -> Result<()> {
        let profile_json =
            serde_json::to_string(profile).context("failed to serialize registration profile")?;
        let query = r"
            INSERT INTO pending_registrations (contact, profile_json)
            VALUES ($1, $2::jsonb)
            ON CONFLICT (contact)
            DO UPDATE SET profile_json = EXCLUDED.profile_json, updated_at = NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(contact)
            .bind(profile_json)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to upsert pending registration")?;
        Ok(())
    }

    async fn pending_registration(&self, contact: &str) -> Result<Option<RegistrationProfile>> {
        let query = r"
            SELECT profile_json::text AS profile_json
            FROM pending_registrations
            WHERE contact = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(contact)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch pending registration")?;

        row.map(|row| {
            let profile_json: String = row.get("profile_json");
            serde_json::from_str(&profile_json)
                .context("failed to deserialize registration profile")
        })
        .transpose()
    }

    async fn create_user_account(
        &self,
        contact: &str,
        profile: &RegistrationProfile,
    ) -> Result<AccountOutcome> {
        let query = r"
            INSERT INTO users (email, first_name, last_name, date_of_birth, phone, email_verified_at)
            VALUES ($1, $2, $3, $4::date, $5, NOW())
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(contact)
            .bind(profile.first_name.as_deref())
            .bind(profile.last_name.as_deref())
            .bind(profile.date_of_birth.as_deref())
            .bind(profile.phone.as_deref())
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(AccountOutcome::Created),
            Err(err) if is_unique_violation(&err) => Ok(AccountOutcome::AlreadyExists),
            Err(err) => Err(err).context("failed to create user account"),
        }
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let query = "DELETE FROM otp_codes WHERE expires_at < $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(cutoff)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to purge expired otp records")?;
        Ok(result.rows_affected())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
