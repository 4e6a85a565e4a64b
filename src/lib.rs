//! # Sesamo (One-Time Passcode Service)
//!
//! `sesamo` owns the OTP lifecycle for email-based registration flows:
//! issuance, hashed storage, verification, attempt limiting, expiry, and
//! resend.
//!
//! ## Code Handling
//!
//! Plaintext codes are never persisted. Each issuance draws a uniform
//! 6-digit code (leading zeros included), a fresh random salt, and stores
//! `HMAC-SHA-256(secret, code || salt)` hex-encoded. Verification recomputes
//! the tag and compares in constant time.
//!
//! ## Record Selection
//!
//! Multiple records may exist per contact over time; only the newest one
//! (by `created_at`) is authoritative. Issuing or resending therefore
//! resets the effective attempt budget without mutating older rows.
//!
//! ## Client State Machines
//!
//! The [`client`] module carries the countdown and 6-cell digit input as
//! pure transition functions, driven by values handed in per tick. Browser
//! frontends render from the returned state; no timer or DOM logic lives
//! here.

pub mod api;
pub mod cli;
pub mod client;
pub mod email;
pub mod otp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
