//! Sign-in configuration passed explicitly to the engine.

use std::time::Duration;

use super::error::ConfigError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Attempt budget for one throttle key: at most `max_attempts` per fixed `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Throttle {
    max_attempts: u32,
    window: Duration,
}

impl Throttle {
    /// # Errors
    /// Returns `ConfigError::ZeroWindow` when `window` is zero.
    pub fn new(max_attempts: u32, window: Duration) -> Result<Self, ConfigError> {
        if window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(Self {
            max_attempts,
            window,
        })
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: DEFAULT_WINDOW,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SignInConfig {
    throttle: Throttle,
    store_timeout: Duration,
}

impl SignInConfig {
    #[must_use]
    pub fn new(throttle: Throttle) -> Self {
        Self {
            throttle,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// # Errors
    /// Returns `ConfigError::ZeroTimeout` when `timeout` is zero.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.store_timeout = timeout;
        Ok(self)
    }

    #[must_use]
    pub fn throttle(&self) -> Throttle {
        self.throttle
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}

impl Default for SignInConfig {
    fn default() -> Self {
        Self::new(Throttle::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_rejects_zero_window() {
        assert_eq!(
            Throttle::new(3, Duration::ZERO),
            Err(ConfigError::ZeroWindow)
        );
    }

    #[test]
    fn throttle_accepts_zero_attempts() {
        let throttle = Throttle::new(0, Duration::from_secs(40));
        assert_eq!(throttle.map(|t| t.max_attempts()), Ok(0));
    }

    #[test]
    fn config_defaults() {
        let config = SignInConfig::default();
        assert_eq!(config.throttle().max_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.throttle().window(), DEFAULT_WINDOW);
        assert_eq!(config.store_timeout(), DEFAULT_STORE_TIMEOUT);
    }

    #[test]
    fn config_rejects_zero_timeout() {
        let result = SignInConfig::default().with_store_timeout(Duration::ZERO);
        assert_eq!(result.map(|c| c.store_timeout()), Err(ConfigError::ZeroTimeout));
    }
}
