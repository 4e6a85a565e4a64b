//! OTP lifecycle engine: issuance, verification, attempt limiting, resend.
//!
//! The engine never stores plaintext codes and never trusts client clocks;
//! callers receive the server-computed expiry with every issuance. All
//! record mutations go through conditional updates so concurrent
//! verification attempts cannot lose increments or double-consume.

pub mod code;
pub mod engine;
pub mod memory;
pub mod models;
pub mod pg;
pub mod purge;
pub mod rate_limit;
pub mod store;

pub use engine::{Issued, IssueError, OtpConfig, OtpEngine, ResendError, Verified, VerifyError};
pub use memory::MemoryOtpStore;
pub use pg::PgOtpStore;
pub use store::OtpStore;
