//! Attempt limiting for sign-in flows.
//!
//! Flow Overview:
//! 1) Count the attempt for the throttle key (atomic increment, fixed window).
//! 2) Reject with `LockedOut` once the count exceeds the budget.
//! 3) Otherwise run the wrapped action and hand back its result untouched.
//!
//! The window starts at the first attempt and expires exactly `window` later;
//! further attempts inside the window never push the expiry out.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{bounded, config::Throttle, error::AuthError};

/// Counter state right after an attempt was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hit {
    /// Attempts in the current window, including this one.
    pub attempts: u64,
    /// Time left until the window resets.
    pub resets_in: Duration,
}

/// Storage for attempt counters.
///
/// `hit` must expire-or-increment in a single atomic step; implementations may
/// not split it into a read followed by a write.
#[async_trait]
pub trait AttemptCounter: Send + Sync {
    async fn hit(&self, key: &str, window: Duration) -> Result<Hit>;

    /// Attempts recorded in the live window, 0 once it expired.
    async fn attempts(&self, key: &str) -> Result<u64>;

    async fn clear(&self, key: &str) -> Result<()>;

    /// Drop windows that already expired, returns how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

#[derive(Clone, Copy, Debug)]
struct Window {
    attempts: u64,
    expires_at: Instant,
}

/// Process-local counters, suitable for a single instance and for tests.
#[derive(Debug, Default)]
pub struct MemoryAttemptCounter {
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryAttemptCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn tracked_keys(&self) -> usize {
        self.windows.lock().await.len()
    }
}

#[async_trait]
impl AttemptCounter for MemoryAttemptCounter {
    async fn hit(&self, key: &str, window: Duration) -> Result<Hit> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(key.to_string()).or_insert(Window {
            attempts: 0,
            expires_at: now + window,
        });

        if entry.expires_at <= now {
            entry.attempts = 0;
            entry.expires_at = now + window;
        }
        entry.attempts = entry.attempts.saturating_add(1);

        Ok(Hit {
            attempts: entry.attempts,
            resets_in: entry.expires_at.saturating_duration_since(now),
        })
    }

    async fn attempts(&self, key: &str) -> Result<u64> {
        let now = Instant::now();
        let windows = self.windows.lock().await;
        Ok(windows
            .get(key)
            .filter(|window| window.expires_at > now)
            .map_or(0, |window| window.attempts))
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.windows.lock().await.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| window.expires_at > now);
        Ok(u64::try_from(before - windows.len()).unwrap_or(u64::MAX))
    }
}

/// Wraps an action with a per-key attempt budget.
#[derive(Clone)]
pub struct RateLimiter {
    counter: Arc<dyn AttemptCounter>,
    timeout: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(counter: Arc<dyn AttemptCounter>, timeout: Duration) -> Self {
        Self { counter, timeout }
    }

    /// Record an attempt for `key` and run `action` if the budget allows it.
    ///
    /// # Errors
    /// `LockedOut` when the attempt exceeds `throttle`, `Unavailable` when the
    /// counter fails or times out, otherwise whatever `action` returns.
    pub async fn limit<T, F, Fut>(
        &self,
        key: &str,
        throttle: Throttle,
        action: F,
    ) -> Result<T, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AuthError>>,
    {
        let hit = bounded(
            self.timeout,
            "attempt counter",
            self.counter.hit(key, throttle.window()),
        )
        .await?;

        if hit.attempts > u64::from(throttle.max_attempts()) {
            warn!(
                attempts = hit.attempts,
                retry_after_ms = u64::try_from(hit.resets_in.as_millis()).unwrap_or(u64::MAX),
                "Throttle key locked out"
            );
            return Err(AuthError::LockedOut {
                retry_after: hit.resets_in,
            });
        }

        debug!(attempts = hit.attempts, "Attempt allowed");
        action().await
    }

    /// # Errors
    /// `Unavailable` when the counter fails or times out.
    pub async fn attempts(&self, key: &str) -> Result<u64, AuthError> {
        bounded(self.timeout, "attempt counter", self.counter.attempts(key)).await
    }

    /// # Errors
    /// `Unavailable` when the counter fails or times out.
    pub async fn clear(&self, key: &str) -> Result<(), AuthError> {
        bounded(self.timeout, "attempt counter", self.counter.clear(key)).await
    }
}
