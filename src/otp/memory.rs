//! In-memory record store.
//!
//! Backs the engine test-bench and single-process development runs. The
//! mutex around the whole state gives the same serialization guarantees
//! the Postgres store gets from conditional updates.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{
    AccountOutcome, AttemptOutcome, ConsumeOutcome, IssuanceActivity, NewOtpRecord, OtpRecord,
    RegistrationProfile,
};
use super::store::OtpStore;

#[derive(Debug, Default)]
struct Inner {
    records: Vec<OtpRecord>,
    pending: HashMap<String, RegistrationProfile>,
    accounts: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryOtpStore {
    inner: Mutex<Inner>,
}

impl MemoryOtpStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live record rows, for purge assertions.
    pub async fn record_count(&self) -> usize {
        self.inner.lock().await.records.len()
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn insert_record(&self, record: NewOtpRecord) -> Result<OtpRecord> {
        let mut inner = self.inner.lock().await;
        let record = OtpRecord {
            id: Uuid::new_v4(),
            contact: record.contact,
            code_hash: record.code_hash,
            salt: record.salt,
            attempts: 0,
            created_at: Utc::now(),
            expires_at: record.expires_at,
            consumed_at: None,
        };
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn latest_record(&self, contact: &str) -> Result<Option<OtpRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .iter()
            .filter(|record| record.contact == contact)
            .max_by_key(|record| record.created_at)
            .cloned())
    }

    async fn issuance_activity(
        &self,
        contact: &str,
        since: DateTime<Utc>,
    ) -> Result<IssuanceActivity> {
        let inner = self.inner.lock().await;
        let mut count = 0;
        let mut oldest: Option<DateTime<Utc>> = None;
        for record in &inner.records {
            if record.contact == contact && record.created_at > since {
                count += 1;
                oldest = Some(match oldest {
                    Some(current) => current.min(record.created_at),
                    None => record.created_at,
                });
            }
        }
        Ok(IssuanceActivity { count, oldest })
    }

    async fn register_failed_attempt(&self, id: Uuid, cap: i32) -> Result<AttemptOutcome> {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.records.iter_mut().find(|record| record.id == id) else {
            return Ok(AttemptOutcome::Capped);
        };
        if record.consumed_at.is_some() || record.attempts >= cap {
            return Ok(AttemptOutcome::Capped);
        }
        record.attempts += 1;
        Ok(AttemptOutcome::Incremented {
            attempts: record.attempts,
        })
    }

    async fn consume(&self, id: Uuid) -> Result<ConsumeOutcome> {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.records.iter_mut().find(|record| record.id == id) else {
            return Ok(ConsumeOutcome::AlreadyConsumed);
        };
        if record.consumed_at.is_some() {
            return Ok(ConsumeOutcome::AlreadyConsumed);
        }
        record.consumed_at = Some(Utc::now());
        Ok(ConsumeOutcome::Consumed)
    }

    async fn upsert_pending_registration(
        &self,
        contact: &str,
        profile: &RegistrationProfile,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.pending.insert(contact.to_string(), profile.clone());
        Ok(())
    }

    async fn pending_registration(&self, contact: &str) -> Result<Option<RegistrationProfile>> {
        let inner = self.inner.lock().await;
        Ok(inner.pending.get(contact).cloned())
    }

    async fn create_user_account(
        &self,
        contact: &str,
        _profile: &RegistrationProfile,
    ) -> Result<AccountOutcome> {
        let mut inner = self.inner.lock().await;
        Ok(if inner.accounts.insert(contact.to_string()) {
            AccountOutcome::Created
        } else {
            AccountOutcome::AlreadyExists
        })
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.records.len();
        inner.records.retain(|record| record.expires_at >= cutoff);
        Ok((before - inner.records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_record(contact: &str, expires_at: DateTime<Utc>) -> NewOtpRecord {
        NewOtpRecord {
            contact: contact.to_string(),
            code_hash: "hash".to_string(),
            salt: "salt".to_string(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn latest_record_picks_newest() -> Result<()> {
        let store = MemoryOtpStore::new();
        let expires = Utc::now() + Duration::seconds(300);
        let first = store.insert_record(new_record("a@x.com", expires)).await?;
        let second = store.insert_record(new_record("a@x.com", expires)).await?;
        store.insert_record(new_record("b@x.com", expires)).await?;

        let latest = store.latest_record("a@x.com").await?.expect("record");
        assert_ne!(latest.id, first.id);
        assert_eq!(latest.id, second.id);
        Ok(())
    }

    #[tokio::test]
    async fn attempt_increment_stops_at_cap() -> Result<()> {
        let store = MemoryOtpStore::new();
        let expires = Utc::now() + Duration::seconds(300);
        let record = store.insert_record(new_record("a@x.com", expires)).await?;

        for expected in 1..=3 {
            assert_eq!(
                store.register_failed_attempt(record.id, 3).await?,
                AttemptOutcome::Incremented {
                    attempts: expected
                }
            );
        }
        assert_eq!(
            store.register_failed_attempt(record.id, 3).await?,
            AttemptOutcome::Capped
        );
        Ok(())
    }

    #[tokio::test]
    async fn consume_applies_once() -> Result<()> {
        let store = MemoryOtpStore::new();
        let expires = Utc::now() + Duration::seconds(300);
        let record = store.insert_record(new_record("a@x.com", expires)).await?;

        assert_eq!(store.consume(record.id).await?, ConsumeOutcome::Consumed);
        assert_eq!(
            store.consume(record.id).await?,
            ConsumeOutcome::AlreadyConsumed
        );
        // A consumed record no longer accepts attempt increments.
        assert_eq!(
            store.register_failed_attempt(record.id, 3).await?,
            AttemptOutcome::Capped
        );
        Ok(())
    }

    #[tokio::test]
    async fn purge_drops_only_expired_rows() -> Result<()> {
        let store = MemoryOtpStore::new();
        let now = Utc::now();
        store
            .insert_record(new_record("a@x.com", now - Duration::seconds(10)))
            .await?;
        store
            .insert_record(new_record("b@x.com", now + Duration::seconds(300)))
            .await?;

        assert_eq!(store.purge_expired(now).await?, 1);
        assert_eq!(store.record_count().await, 1);
        Ok(())
    }
}
