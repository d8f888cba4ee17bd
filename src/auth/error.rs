//! Error kinds surfaced by the sign-in core.

use std::time::Duration;

/// Outcome of a failed authentication call.
///
/// `AuthenticationFailed` never says whether the identity exists. `Unavailable`
/// wraps infrastructure faults so callers can tell them apart from bad input.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("Too many attempts: retry in {}s", ceil_seconds(.retry_after))]
    LockedOut { retry_after: Duration },
    #[error("Authentication backend unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

impl AuthError {
    /// Seconds a locked out caller should wait, rounded up.
    #[must_use]
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::LockedOut { retry_after } => Some(ceil_seconds(retry_after)),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Invalid throttle configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Rate limit window must be greater than zero")]
    ZeroWindow,
    #[error("Store timeout must be greater than zero")]
    ZeroTimeout,
}

fn ceil_seconds(retry_after: &Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}
