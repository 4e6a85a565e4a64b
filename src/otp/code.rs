//! Code generation and keyed hashing for one-time passcodes.

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, Rng, RngCore};
use sha2::Sha256;

pub const CODE_LENGTH: usize = 6;
const SALT_LENGTH: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// Draw a 6-digit code uniformly from `[0, 999999]`, zero-padded.
///
/// A code of `000123` is the 6-character string, never the integer; the
/// range deliberately includes leading-zero values.
#[must_use]
pub fn generate_code() -> String {
    let code: u32 = OsRng.gen_range(0..1_000_000);
    format!("{code:06}")
}

/// Create a fresh per-record salt, hex-encoded.
///
/// # Errors
/// Returns an error if the OS randomness source fails.
pub fn generate_salt() -> Result<String> {
    let mut bytes = [0u8; SALT_LENGTH];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate salt")?;
    Ok(hex::encode(bytes))
}

/// Compute the stored tag: hex-encoded `HMAC-SHA-256(secret, code || salt)`.
///
/// # Errors
/// Returns an error if the secret is rejected by the MAC (empty keys are
/// accepted by HMAC, so this is effectively infallible in practice).
pub fn hash_code(secret: &[u8], code: &str, salt: &str) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret).context("failed to initialize HMAC for code hash")?;
    mac.update(code.as_bytes());
    mac.update(salt.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Recompute the tag for a candidate code and compare in constant time.
///
/// # Errors
/// Returns an error if the stored hash is not valid hex or the MAC cannot
/// be initialized; both indicate corrupted state rather than a wrong code.
pub fn verify_code(secret: &[u8], candidate: &str, salt: &str, stored_hash: &str) -> Result<bool> {
    let expected = hex::decode(stored_hash).context("stored code hash is not valid hex")?;
    let mut mac =
        HmacSha256::new_from_slice(secret).context("failed to initialize HMAC for code check")?;
    mac.update(candidate.as_bytes());
    mac.update(salt.as_bytes());
    // Mac::verify_slice compares in constant time.
    Ok(mac.verify_slice(&expected).is_ok())
}

/// Exactly six ASCII digits.
#[must_use]
pub fn valid_code_format(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn leading_zero_codes_are_preserved() {
        // With 1M possibilities roughly 10% start with 0; 1000 draws make a
        // miss astronomically unlikely.
        let found = (0..1000).any(|_| generate_code().starts_with('0'));
        assert!(found, "codes starting with 0 should occur");
    }

    #[test]
    fn salts_are_hex_and_unique() {
        let first = generate_salt().expect("salt");
        let second = generate_salt().expect("salt");
        assert_eq!(first.len(), SALT_LENGTH * 2);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn same_code_different_salts_yield_different_hashes() {
        let secret = b"server-secret";
        let first = hash_code(secret, "123456", "aa").expect("hash");
        let second = hash_code(secret, "123456", "bb").expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn verify_accepts_matching_code_only() {
        let secret = b"server-secret";
        let salt = generate_salt().expect("salt");
        let stored = hash_code(secret, "042099", &salt).expect("hash");
        assert!(verify_code(secret, "042099", &salt, &stored).expect("verify"));
        assert!(!verify_code(secret, "042098", &salt, &stored).expect("verify"));
        assert!(!verify_code(b"other-secret", "042099", &salt, &stored).expect("verify"));
    }

    #[test]
    fn verify_rejects_corrupt_stored_hash() {
        assert!(verify_code(b"secret", "123456", "aa", "not-hex").is_err());
    }

    #[test]
    fn code_format_check() {
        assert!(valid_code_format("000123"));
        assert!(!valid_code_format("12345"));
        assert!(!valid_code_format("1234567"));
        assert!(!valid_code_format("12345a"));
        assert!(!valid_code_format("12 456"));
    }
}
