use crate::auth::{PgAttemptCounter, RateLimiter, store::normalize_identity, throttle_key};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
    pub email: String,
    pub client_ip: String,
    pub store_timeout_ms: u64,
}

impl Args {
    /// Throttle key the server uses for this email and IP.
    #[must_use]
    pub fn key(&self) -> String {
        throttle_key(&normalize_identity(&self.email), self.client_ip.trim())
    }
}

/// Reset the attempt counter for one email+IP pair.
/// # Errors
/// Returns an error if the database is unreachable or the counter fails.
pub async fn execute(args: Args) -> Result<()> {
    let timeout = Duration::from_millis(args.store_timeout_ms);
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(timeout)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let limiter = RateLimiter::new(Arc::new(PgAttemptCounter::new(pool)), timeout);
    let key = args.key();
    let cleared = clear(&limiter, &key).await?;

    println!("Cleared {cleared} attempt(s) for {key}");
    Ok(())
}

/// Returns the attempts counted before the reset.
async fn clear(limiter: &RateLimiter, key: &str) -> Result<u64> {
    let attempts = limiter
        .attempts(key)
        .await
        .context("Failed to read attempt counter")?;
    limiter
        .clear(key)
        .await
        .context("Failed to clear attempt counter")?;
    info!(key, attempts, "Cleared sign-in attempts");
    Ok(attempts)
}
