//! Per-IP rate limiting for the OTP endpoints.
//!
//! These counters are in-memory and reset on process restart; the durable
//! per-contact issuance window lives in the record store. Losing the IP
//! counters on restart is an accepted tradeoff, not a correctness
//! requirement.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Request,
    Verify,
    Resend,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

/// Sliding-window counter keyed by `(ip, action)`.
#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    window: Duration,
    max_hits: usize,
    hits: Mutex<HashMap<(String, RateLimitAction), Vec<Instant>>>,
}

impl SlidingWindowRateLimiter {
    #[must_use]
    pub fn new(window: Duration, max_hits: usize) -> Self {
        Self {
            window,
            max_hits,
            hits: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for SlidingWindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        // Requests without a resolvable client IP are not counted; the
        // durable per-contact window still applies to them.
        let Some(ip) = ip else {
            return RateLimitDecision::Allowed;
        };

        let now = Instant::now();
        let Ok(mut hits) = self.hits.lock() else {
            return RateLimitDecision::Limited;
        };
        hits.retain(|_, instants| {
            instants.retain(|instant| now.duration_since(*instant) < self.window);
            !instants.is_empty()
        });

        let entry = hits.entry((ip.to_string(), action)).or_default();
        if entry.len() >= self.max_hits {
            return RateLimitDecision::Limited;
        }
        entry.push(now);
        RateLimitDecision::Allowed
    }
}
