//! # Warden
//!
//! Rate-limited password sign-in that issues opaque API tokens.
//!
//! ## Sign-in
//!
//! Every attempt counts against a throttle key derived from the lower-cased
//! email and client IP. Attempts past the configured budget are locked out
//! until the fixed window that opened with the first attempt expires, even
//! when the credentials are correct.
//!
//! Unknown emails and wrong passwords fail the same way, and both run an
//! Argon2 verification so response timing does not reveal which one it was.
//!
//! ## Tokens
//!
//! A successful sign-in rotates the principal's single active API token.
//! `POST /signout` with that token as a bearer credential revokes it.

pub mod auth;
pub mod cli;
pub mod warden;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
