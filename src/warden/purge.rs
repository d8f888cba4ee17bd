//! Periodic cleanup of expired attempt windows.
//!
//! Counters reset lazily on the next hit for the same key, so keys that never
//! come back would stay in storage forever without this sweep.

use crate::auth::AttemptCounter;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error};

/// Spawn a task deleting expired windows every `every`.
#[must_use]
pub fn spawn(counter: Arc<dyn AttemptCounter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match counter.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "Purged expired sign-in attempts"),
                Err(err) => error!("Failed to purge expired sign-in attempts: {err:#}"),
            }
        }
    })
}
