//! Argon2id password hashing and verification.
//!
//! Stored hashes are PHC strings. Lookups that miss still pay for one
//! verification against a decoy hash so that unknown identities and wrong
//! passwords take comparable time.

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::rngs::OsRng;
use std::sync::OnceLock;
use tracing::error;

const DECOY_PASSWORD: &[u8] = b"warden-decoy-password";

static DECOY_HASH: OnceLock<Option<String>> = OnceLock::new();

/// Hash a password into a PHC string with a fresh random salt.
///
/// # Errors
/// Returns an error if Argon2 fails to produce a hash.
pub fn hash_password(password: &str) -> Result<String> {
    hash_bytes(password.as_bytes())
}

/// Check `password` against a stored PHC hash; malformed hashes never match.
#[must_use]
pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        error!("Stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Compute the decoy hash up front so the first lookup miss does not pay for it.
pub fn prepare_decoy() {
    let _ = decoy_hash();
}

/// Burn one verification for a lookup that found nothing. Always `false`.
#[must_use]
pub fn verify_decoy(password: &str) -> bool {
    if let Some(hash) = decoy_hash() {
        let _ = verify_password(hash, password);
    }
    false
}

fn decoy_hash() -> Option<&'static str> {
    DECOY_HASH
        .get_or_init(|| hash_bytes(DECOY_PASSWORD).ok())
        .as_deref()
}

#[cfg(test)]
pub(crate) fn decoy_ready() -> bool {
    DECOY_HASH.get().is_some_and(Option::is_some)
}

fn hash_bytes(password: &[u8]) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password, &salt)
        .map_err(|err| anyhow::anyhow!("failed to hash password: {err}"))?
        .to_string();
    Ok(hash)
}
