//! Sign-in orchestration: throttle, look up, verify, issue a token.
//!
//! Flow Overview:
//! 1) Derive the throttle key from identity and client IP.
//! 2) Run the whole attempt inside the rate limiter.
//! 3) Look up the principal and verify the password, a miss still verifies
//!    against a decoy so both failures look the same.
//! 4) Rotate the API token, persist it, notify observers.

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{
    bounded,
    config::SignInConfig,
    error::AuthError,
    notify::{AuthNotifier, TracingNotifier},
    rate_limit::{AttemptCounter, RateLimiter},
    store::{CredentialStore, Principal},
    token::TokenGenerator,
};

const STORE: &str = "credential store";

/// Rate limit bucket for an attempt: `lowercase(identity|ip)`.
#[must_use]
pub fn throttle_key(identity: &str, client_ip: &str) -> String {
    format!("{identity}|{client_ip}").to_lowercase()
}

pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    limiter: RateLimiter,
    tokens: Arc<dyn TokenGenerator>,
    notifier: Arc<dyn AuthNotifier>,
    config: SignInConfig,
}

impl Authenticator {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        counter: Arc<dyn AttemptCounter>,
        tokens: Arc<dyn TokenGenerator>,
        config: SignInConfig,
    ) -> Self {
        Self {
            store,
            limiter: RateLimiter::new(counter, config.store_timeout()),
            tokens,
            notifier: Arc::new(TracingNotifier),
            config,
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn AuthNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SignInConfig {
        &self.config
    }

    /// Verify credentials and issue a fresh API token.
    ///
    /// # Errors
    /// `AuthenticationFailed` for unknown identities and wrong passwords alike,
    /// `LockedOut` once the throttle key ran out of attempts, `Unavailable` for
    /// backend faults.
    #[instrument(skip(self, identity, password))]
    pub async fn sign_in(
        &self,
        identity: &str,
        password: &SecretString,
        client_ip: &str,
    ) -> Result<Principal, AuthError> {
        let key = throttle_key(identity, client_ip);
        self.limiter
            .limit(&key, self.config.throttle(), || {
                self.attempt(identity, password)
            })
            .await
    }

    async fn attempt(&self, identity: &str, password: &SecretString) -> Result<Principal, AuthError> {
        let found = self
            .bounded(self.store.find_by_identity(identity))
            .await?;

        let valid = self
            .bounded(self.store.validate_credentials(found.as_ref(), password))
            .await?;

        let mut principal = match found {
            Some(principal) if valid => principal,
            _ => {
                debug!("Credentials rejected");
                return Err(AuthError::AuthenticationFailed);
            }
        };

        let token = self.tokens.generate().map_err(AuthError::Unavailable)?;
        self.bounded(self.store.store_token(principal.id, Some(&token)))
            .await?;
        principal.api_token = Some(token);

        self.notifier.authenticated(&principal);

        Ok(principal)
    }

    /// Resolve a bearer token to its principal.
    ///
    /// # Errors
    /// `AuthenticationFailed` for empty or unknown tokens, `Unavailable` for
    /// backend faults.
    pub async fn authenticate_token(&self, token: &str) -> Result<Principal, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::AuthenticationFailed);
        }
        self.bounded(self.store.find_by_token(token))
            .await?
            .ok_or(AuthError::AuthenticationFailed)
    }

    /// Revoke the principal's active token.
    ///
    /// # Errors
    /// `Unavailable` for backend faults.
    #[instrument(skip(self, principal), fields(principal_id = %principal.id))]
    pub async fn sign_out(&self, principal: &Principal) -> Result<(), AuthError> {
        self.bounded(self.store.store_token(principal.id, None))
            .await?;
        self.notifier.signed_out(principal);
        Ok(())
    }

    /// # Errors
    /// `Unavailable` when the credential store does not answer.
    pub async fn ping(&self) -> Result<(), AuthError> {
        self.bounded(self.store.ping()).await
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, AuthError>
    where
        F: std::future::Future<Output = anyhow::Result<T>>,
    {
        bounded(self.store_timeout(), STORE, operation).await
    }

    fn store_timeout(&self) -> Duration {
        self.config.store_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        config::Throttle,
        rate_limit::MemoryAttemptCounter,
        store::MemoryCredentialStore,
        token::RandomTokenGenerator,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    const IP: &str = "1.2.3.4";

    /// Stores passwords as `hashed:<plain>` so verification is instant.
    #[derive(Default)]
    struct FakeStore {
        principals: Mutex<HashMap<Uuid, Principal>>,
        verifications: AtomicUsize,
        fail: bool,
    }

    impl FakeStore {
        fn with_user(email: &str, password: &str) -> Self {
            let store = Self::default();
            let principal = Principal::new(
                Uuid::new_v4(),
                email.to_lowercase(),
                format!("hashed:{password}"),
                None,
            );
            if let Ok(mut principals) = store.principals.lock() {
                principals.insert(principal.id, principal);
            }
            store
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn token_of(&self, email: &str) -> Option<String> {
            self.principals.lock().ok().and_then(|principals| {
                principals
                    .values()
                    .find(|p| p.email == email)
                    .and_then(|p| p.api_token.clone())
            })
        }
    }

    #[async_trait]
    impl CredentialStore for FakeStore {
        async fn find_by_identity(&self, identity: &str) -> Result<Option<Principal>> {
            if self.fail {
                anyhow::bail!("connection reset");
            }
            let identity = identity.to_lowercase();
            Ok(self.principals.lock().ok().and_then(|principals| {
                principals.values().find(|p| p.email == identity).cloned()
            }))
        }

        async fn find_by_token(&self, token: &str) -> Result<Option<Principal>> {
            if self.fail {
                anyhow::bail!("connection reset");
            }
            Ok(self.principals.lock().ok().and_then(|principals| {
                principals
                    .values()
                    .find(|p| p.api_token.as_deref() == Some(token))
                    .cloned()
            }))
        }

        async fn validate_credentials(
            &self,
            principal: Option<&Principal>,
            password: &SecretString,
        ) -> Result<bool> {
            self.verifications.fetch_add(1, Ordering::SeqCst);
            Ok(principal.is_some_and(|p| {
                p.password_hash() == format!("hashed:{}", password.expose_secret())
            }))
        }

        async fn store_token(&self, principal_id: Uuid, token: Option<&str>) -> Result<()> {
            let mut principals = self
                .principals
                .lock()
                .map_err(|_| anyhow::anyhow!("poisoned"))?;
            if let Some(principal) = principals.get_mut(&principal_id) {
                principal.api_token = token.map(ToString::to_string);
            }
            Ok(())
        }
    }

    /// Hands out `token-1`, `token-2`, ... and counts calls.
    #[derive(Default)]
    struct SpyTokens {
        calls: AtomicUsize,
    }

    impl SpyTokens {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenGenerator for SpyTokens {
        fn generate(&self) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("token-{n}"))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        authenticated: Mutex<Vec<Uuid>>,
        signed_out: Mutex<Vec<Uuid>>,
    }

    impl AuthNotifier for RecordingNotifier {
        fn authenticated(&self, principal: &Principal) {
            if let Ok(mut seen) = self.authenticated.lock() {
                seen.push(principal.id);
            }
        }

        fn signed_out(&self, principal: &Principal) {
            if let Ok(mut seen) = self.signed_out.lock() {
                seen.push(principal.id);
            }
        }
    }

    struct Harness {
        auth: Authenticator,
        store: Arc<FakeStore>,
        tokens: Arc<SpyTokens>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(store: FakeStore, max_attempts: u32, window_secs: u64) -> Harness {
        let store = Arc::new(store);
        let tokens = Arc::new(SpyTokens::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let throttle =
            Throttle::new(max_attempts, Duration::from_secs(window_secs)).unwrap_or_default();
        let auth = Authenticator::new(
            store.clone(),
            Arc::new(MemoryAttemptCounter::new()),
            tokens.clone(),
            SignInConfig::new(throttle),
        )
        .with_notifier(notifier.clone());
        Harness {
            auth,
            store,
            tokens,
            notifier,
        }
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn throttle_key_is_lowercased_and_joined() {
        assert_eq!(
            throttle_key("User@Mail.com", "Testing-IP"),
            "user@mail.com|testing-ip"
        );
        assert_eq!(
            throttle_key("User@Mail.com", IP),
            throttle_key("user@mail.com", IP)
        );
    }

    #[tokio::test]
    async fn signs_in_and_persists_new_token() -> Result<()> {
        let h = harness(FakeStore::with_user("user@mail.com", "secret123"), 5, 60);

        let principal = h
            .auth
            .sign_in("user@mail.com", &secret("secret123"), IP)
            .await?;

        assert_eq!(principal.email, "user@mail.com");
        assert_eq!(principal.api_token.as_deref(), Some("token-1"));
        assert_eq!(h.store.token_of("user@mail.com").as_deref(), Some("token-1"));
        assert_eq!(h.tokens.calls(), 1);
        assert_eq!(
            h.notifier.authenticated.lock().map(|seen| seen.clone()).ok(),
            Some(vec![principal.id])
        );
        Ok(())
    }

    #[tokio::test]
    async fn each_sign_in_rotates_the_token() -> Result<()> {
        let h = harness(FakeStore::with_user("user@mail.com", "secret123"), 5, 60);

        let first = h
            .auth
            .sign_in("user@mail.com", &secret("secret123"), IP)
            .await?;
        let second = h
            .auth
            .sign_in("user@mail.com", &secret("secret123"), IP)
            .await?;

        assert_ne!(first.api_token, second.api_token);
        assert_eq!(h.store.token_of("user@mail.com"), second.api_token);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_identity_fails_without_issuing_token() {
        let h = harness(FakeStore::default(), 5, 60);

        let result = h
            .auth
            .sign_in("user@mail.com", &secret("password"), IP)
            .await;

        assert!(matches!(result, Err(AuthError::AuthenticationFailed)));
        assert_eq!(h.tokens.calls(), 0);
        // The miss still went through the verification primitive.
        assert_eq!(h.store.verifications.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wrong_password_fails_without_issuing_token() {
        let h = harness(FakeStore::with_user("user@mail.com", "secret123"), 5, 60);

        let result = h.auth.sign_in("user@mail.com", &secret("wrong"), IP).await;

        assert!(matches!(result, Err(AuthError::AuthenticationFailed)));
        assert_eq!(h.tokens.calls(), 0);
        assert!(h.store.token_of("user@mail.com").is_none());
        assert!(h
            .notifier
            .authenticated
            .lock()
            .map(|seen| seen.is_empty())
            .unwrap_or(false));
    }

    #[tokio::test(start_paused = true)]
    async fn locks_out_after_budget_even_with_correct_password() {
        let h = harness(FakeStore::with_user("user@mail.com", "secret123"), 3, 40);

        for _ in 0..3 {
            let result = h.auth.sign_in("user@mail.com", &secret("wrong"), IP).await;
            assert!(matches!(result, Err(AuthError::AuthenticationFailed)));
        }

        let result = h
            .auth
            .sign_in("user@mail.com", &secret("secret123"), IP)
            .await;
        match result {
            Err(AuthError::LockedOut { retry_after }) => {
                assert!(retry_after <= Duration::from_secs(40));
                assert!(retry_after > Duration::ZERO);
            }
            other => panic!("expected lockout, got {other:?}"),
        }
        assert_eq!(h.tokens.calls(), 0);
        assert_eq!(h.store.verifications.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn lockout_lifts_once_window_elapses() -> Result<()> {
        let h = harness(FakeStore::with_user("user@mail.com", "secret123"), 3, 40);

        for _ in 0..3 {
            let _ = h.auth.sign_in("user@mail.com", &secret("wrong"), IP).await;
            tokio::time::advance(Duration::from_secs(5)).await;
        }
        let locked = h
            .auth
            .sign_in("user@mail.com", &secret("secret123"), IP)
            .await;
        assert!(matches!(locked, Err(AuthError::LockedOut { .. })));

        // 40s measured from the first attempt, not the last.
        tokio::time::advance(Duration::from_secs(25)).await;
        let principal = h
            .auth
            .sign_in("user@mail.com", &secret("secret123"), IP)
            .await?;
        assert!(principal.api_token.is_some());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn identity_case_shares_one_counter() {
        let h = harness(FakeStore::with_user("user@mail.com", "secret123"), 1, 40);

        let first = h.auth.sign_in("User@Mail.com", &secret("wrong"), IP).await;
        assert!(matches!(first, Err(AuthError::AuthenticationFailed)));

        let second = h
            .auth
            .sign_in("user@mail.com", &secret("secret123"), IP)
            .await;
        assert!(matches!(second, Err(AuthError::LockedOut { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn other_ip_has_its_own_counter() -> Result<()> {
        let h = harness(FakeStore::with_user("user@mail.com", "secret123"), 1, 40);

        let _ = h.auth.sign_in("user@mail.com", &secret("wrong"), IP).await;
        let principal = h
            .auth
            .sign_in("user@mail.com", &secret("secret123"), "5.6.7.8")
            .await?;
        assert!(principal.api_token.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn store_failure_is_unavailable_not_auth_failure() {
        let h = harness(FakeStore::failing(), 5, 60);

        let result = h
            .auth
            .sign_in("user@mail.com", &secret("secret123"), IP)
            .await;

        assert!(matches!(result, Err(AuthError::Unavailable(_))));
        assert_eq!(h.tokens.calls(), 0);
    }

    #[tokio::test]
    async fn token_generator_failure_is_unavailable() {
        struct BrokenTokens;
        impl TokenGenerator for BrokenTokens {
            fn generate(&self) -> Result<String> {
                anyhow::bail!("entropy source unavailable")
            }
        }

        let store = Arc::new(FakeStore::with_user("user@mail.com", "secret123"));
        let auth = Authenticator::new(
            store.clone(),
            Arc::new(MemoryAttemptCounter::new()),
            Arc::new(BrokenTokens),
            SignInConfig::default(),
        );

        let result = auth.sign_in("user@mail.com", &secret("secret123"), IP).await;
        assert!(matches!(result, Err(AuthError::Unavailable(_))));
        assert!(store.token_of("user@mail.com").is_none());
    }

    #[tokio::test]
    async fn bearer_token_resolves_and_sign_out_revokes() -> Result<()> {
        let h = harness(FakeStore::with_user("user@mail.com", "secret123"), 5, 60);
        let principal = h
            .auth
            .sign_in("user@mail.com", &secret("secret123"), IP)
            .await?;
        let token = principal.api_token.clone().unwrap_or_default();

        let resolved = h.auth.authenticate_token(&token).await?;
        assert_eq!(resolved.id, principal.id);

        h.auth.sign_out(&resolved).await?;
        assert!(h.store.token_of("user@mail.com").is_none());
        assert!(matches!(
            h.auth.authenticate_token(&token).await,
            Err(AuthError::AuthenticationFailed)
        ));
        assert_eq!(
            h.notifier.signed_out.lock().map(|seen| seen.len()).ok(),
            Some(1)
        );
        Ok(())
    }

    #[tokio::test]
    async fn blank_bearer_token_is_rejected() {
        let h = harness(FakeStore::default(), 5, 60);
        assert!(matches!(
            h.auth.authenticate_token("  ").await,
            Err(AuthError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn signs_in_against_argon2_memory_store() -> Result<()> {
        let store = Arc::new(MemoryCredentialStore::new());
        store.insert("user@mail.com", "secret123").await?;
        let auth = Authenticator::new(
            store.clone(),
            Arc::new(MemoryAttemptCounter::new()),
            Arc::new(RandomTokenGenerator),
            SignInConfig::new(Throttle::new(3, Duration::from_secs(40))?)
                .with_store_timeout(Duration::from_secs(30))?,
        );

        let principal = auth
            .sign_in("user@mail.com", &secret("secret123"), IP)
            .await?;
        let token = principal.api_token.clone().unwrap_or_default();
        assert!(!token.is_empty());

        let stored = store.find_by_identity("user@mail.com").await?;
        assert_eq!(stored.and_then(|p| p.api_token), Some(token));

        let result = auth.sign_in("user@mail.com", &secret("wrong"), IP).await;
        assert!(matches!(result, Err(AuthError::AuthenticationFailed)));
        Ok(())
    }
}
