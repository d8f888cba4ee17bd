//! Opaque API token generation.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};

const TOKEN_BYTES: usize = 32;

/// Produces unguessable bearer tokens. Implementations know nothing about
/// the principal the token is issued to.
pub trait TokenGenerator: Send + Sync {
    /// # Errors
    /// Returns an error if no randomness is available.
    fn generate(&self) -> Result<String>;
}

/// 256 bits from the OS CSPRNG, base64url without padding.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomTokenGenerator;

impl TokenGenerator for RandomTokenGenerator {
    fn generate(&self) -> Result<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate api token")?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }
}
