//! Background sweep for expired OTP rows.
//!
//! Purely housekeeping: verification already ignores stale rows through
//! newest-record-wins, so a missed sweep costs disk, not correctness.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error};

use super::store::OtpStore;

pub fn spawn_purge_worker(
    store: Arc<dyn OtpStore>,
    interval_seconds: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = Duration::from_secs(interval_seconds);
        if interval.is_zero() {
            interval = Duration::from_secs(1);
        }

        loop {
            match store.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => debug!("purged {purged} expired otp records"),
                Err(err) => error!("otp purge sweep failed: {err}"),
            }

            sleep(interval).await;
        }
    })
}
