//! Rate-limited credential verification and API token issuance.
//!
//! The `Authenticator` is wired from four collaborators passed in explicitly:
//! a `CredentialStore`, an `AttemptCounter` (wrapped in a `RateLimiter`), a
//! `TokenGenerator` and an optional `AuthNotifier`.
//!
//! ## Attempt limiting
//!
//! Every sign-in attempt counts against `lowercase(identity|client_ip)`,
//! successful or not. Once the fixed window holds more than `max_attempts`
//! hits, further attempts fail with `LockedOut` until the window that opened
//! with the first attempt expires.
//!
//! ## Bounded latency
//!
//! Store and counter calls run under the configured store timeout. A slow or
//! failing backend surfaces as `Unavailable`, never as `AuthenticationFailed`.

use std::future::Future;
use std::time::Duration;
use tracing::error;

pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod password;
pub mod postgres;
pub mod rate_limit;
pub mod store;
pub mod token;

pub use config::{SignInConfig, Throttle};
pub use engine::{Authenticator, throttle_key};
pub use error::{AuthError, ConfigError};
pub use notify::{AuthNotifier, TracingNotifier};
pub use postgres::{PgAttemptCounter, PgCredentialStore};
pub use rate_limit::{AttemptCounter, Hit, MemoryAttemptCounter, RateLimiter};
pub use store::{CredentialStore, MemoryCredentialStore, Principal};
pub use token::{RandomTokenGenerator, TokenGenerator};

/// Run a backend call under `timeout`, mapping faults to `Unavailable`.
pub(crate) async fn bounded<T, F>(
    timeout: Duration,
    backend: &'static str,
    operation: F,
) -> Result<T, AuthError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            error!("{backend} failed: {err:#}");
            Err(AuthError::Unavailable(err.context(format!("{backend} failed"))))
        }
        Err(_) => {
            error!("{backend} timed out after {}ms", timeout.as_millis());
            Err(AuthError::Unavailable(anyhow::anyhow!(
                "{backend} timed out after {}ms",
                timeout.as_millis()
            )))
        }
    }
}
