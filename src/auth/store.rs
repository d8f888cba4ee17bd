//! Principal records and the credential store seam.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::password;

/// An account that can sign in.
#[derive(Clone)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    password_hash: String,
    pub api_token: Option<String>,
}

impl Principal {
    #[must_use]
    pub fn new(id: Uuid, email: String, password_hash: String, api_token: Option<String>) -> Self {
        Self {
            id,
            email,
            password_hash,
            api_token,
        }
    }

    #[must_use]
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Normalize an identity for lookup/uniqueness checks.
#[must_use]
pub fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}

/// Durable home of principal records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Lookup by identity key; case is normalized by the store.
    async fn find_by_identity(&self, identity: &str) -> Result<Option<Principal>>;

    async fn find_by_token(&self, token: &str) -> Result<Option<Principal>>;

    /// Verification primitive. `None` means the lookup missed; the store must
    /// still do comparable work and answer `false`.
    async fn validate_credentials(
        &self,
        principal: Option<&Principal>,
        password: &SecretString,
    ) -> Result<bool>;

    /// Replace (or clear, with `None`) the principal's active token.
    async fn store_token(&self, principal_id: Uuid, token: Option<&str>) -> Result<()>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Argon2 verification on the blocking pool, shared by the bundled stores.
///
/// # Errors
/// Returns an error if the blocking task panicked or was cancelled.
pub async fn verify_argon2(principal: Option<&Principal>, password: &SecretString) -> Result<bool> {
    let stored_hash = principal.map(|p| p.password_hash().to_string());
    let password = SecretString::from(password.expose_secret().to_owned());
    tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => password::verify_password(&hash, password.expose_secret()),
        None => password::verify_decoy(password.expose_secret()),
    })
    .await
    .context("password verification task failed")
}

/// Process-local store, used by tests and single-node demos.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    principals: RwLock<HashMap<Uuid, Principal>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        password::prepare_decoy();
        Self::default()
    }

    /// Add a principal with a freshly hashed password.
    ///
    /// # Errors
    /// Returns an error if the identity is taken or hashing fails.
    pub async fn insert(&self, email: &str, password: &str) -> Result<Principal> {
        let password_hash = password::hash_password(password)?;
        self.insert_hashed(email, password_hash).await
    }

    /// Add a principal with an already computed PHC hash.
    ///
    /// # Errors
    /// Returns an error if the identity is taken.
    pub async fn insert_hashed(&self, email: &str, password_hash: String) -> Result<Principal> {
        let email = normalize_identity(email);
        let mut principals = self.principals.write().await;
        if principals.values().any(|p| p.email == email) {
            bail!("identity already registered: {email}");
        }
        let principal = Principal::new(Uuid::now_v7(), email, password_hash, None);
        principals.insert(principal.id, principal.clone());
        Ok(principal)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<Principal>> {
        let identity = normalize_identity(identity);
        let principals = self.principals.read().await;
        Ok(principals.values().find(|p| p.email == identity).cloned())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Principal>> {
        if token.is_empty() {
            return Ok(None);
        }
        let principals = self.principals.read().await;
        Ok(principals
            .values()
            .find(|p| p.api_token.as_deref() == Some(token))
            .cloned())
    }

    async fn validate_credentials(
        &self,
        principal: Option<&Principal>,
        password: &SecretString,
    ) -> Result<bool> {
        verify_argon2(principal, password).await
    }

    async fn store_token(&self, principal_id: Uuid, token: Option<&str>) -> Result<()> {
        let mut principals = self.principals.write().await;
        let principal = principals
            .get_mut(&principal_id)
            .with_context(|| format!("principal {principal_id} not found"))?;
        principal.api_token = token.map(ToString::to_string);
        Ok(())
    }
}
