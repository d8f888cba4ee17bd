//! PostgreSQL-backed credential store and attempt counters.
//!
//! Flow Overview:
//! 1) Principals live in `principals`, looked up by `lower(email)` or token.
//! 2) Attempt counters live in `sign_in_attempts`; one upsert both resets an
//!    expired window and increments, so concurrent attempts never race.
//!
//! Scaling: counters are shared by every instance pointing at the database.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use sqlx::{Connection, PgPool, Row, postgres::PgRow};
use std::time::Duration;
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::{
    password,
    rate_limit::{AttemptCounter, Hit},
    store::{CredentialStore, Principal, normalize_identity, verify_argon2},
};

pub const SCHEMA_SQL: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

fn query_span(operation: &'static str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation
    )
}

fn principal_from_row(row: &PgRow) -> Result<Principal> {
    Ok(Principal::new(
        row.try_get("id")?,
        row.try_get("email")?,
        row.try_get("password_hash")?,
        row.try_get("api_token")?,
    ))
}

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        password::prepare_decoy();
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<Principal>> {
        let query = "SELECT id, email, password_hash, api_token FROM principals WHERE lower(email) = $1";
        let row = sqlx::query(query)
            .bind(normalize_identity(identity))
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT"))
            .await
            .context("failed to look up principal by email")?;
        row.as_ref().map(principal_from_row).transpose()
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Principal>> {
        if token.is_empty() {
            return Ok(None);
        }
        let query = "SELECT id, email, password_hash, api_token FROM principals WHERE api_token = $1";
        let row = sqlx::query(query)
            .bind(token)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT"))
            .await
            .context("failed to look up principal by token")?;
        row.as_ref().map(principal_from_row).transpose()
    }

    async fn validate_credentials(
        &self,
        principal: Option<&Principal>,
        password: &SecretString,
    ) -> Result<bool> {
        verify_argon2(principal, password).await
    }

    async fn store_token(&self, principal_id: Uuid, token: Option<&str>) -> Result<()> {
        let query = "UPDATE principals SET api_token = $2, updated_at = NOW() WHERE id = $1";
        let result = sqlx::query(query)
            .bind(principal_id)
            .bind(token)
            .execute(&self.pool)
            .instrument(query_span("UPDATE"))
            .await
            .context("failed to store api token")?;
        if result.rows_affected() == 0 {
            anyhow::bail!("principal {principal_id} not found");
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .instrument(info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            ))
            .await
            .context("failed to acquire database connection")?;
        conn.ping()
            .instrument(info_span!(
                "db.ping",
                db.system = "postgresql",
                db.operation = "PING"
            ))
            .await
            .context("failed to ping database")
    }
}

#[derive(Clone, Debug)]
pub struct PgAttemptCounter {
    pool: PgPool,
}

impl PgAttemptCounter {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptCounter for PgAttemptCounter {
    async fn hit(&self, key: &str, window: Duration) -> Result<Hit> {
        let query = r"
            INSERT INTO sign_in_attempts AS a (throttle_key, attempts, expires_at)
            VALUES ($1, 1, NOW() + make_interval(secs => $2))
            ON CONFLICT (throttle_key) DO UPDATE SET
                attempts = CASE WHEN a.expires_at <= NOW() THEN 1 ELSE a.attempts + 1 END,
                expires_at = CASE WHEN a.expires_at <= NOW() THEN EXCLUDED.expires_at ELSE a.expires_at END
            RETURNING attempts,
                GREATEST(EXTRACT(EPOCH FROM (expires_at - NOW())), 0)::float8 AS resets_in
        ";
        let row = sqlx::query(query)
            .bind(key)
            .bind(window.as_secs_f64())
            .fetch_one(&self.pool)
            .instrument(query_span("UPSERT"))
            .await
            .context("failed to record sign-in attempt")?;

        let attempts: i64 = row.try_get("attempts")?;
        let resets_in: f64 = row.try_get("resets_in")?;
        Ok(Hit {
            attempts: u64::try_from(attempts).unwrap_or(0),
            resets_in: Duration::try_from_secs_f64(resets_in).unwrap_or(Duration::ZERO),
        })
    }

    async fn attempts(&self, key: &str) -> Result<u64> {
        let query = "SELECT attempts FROM sign_in_attempts WHERE throttle_key = $1 AND expires_at > NOW()";
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT"))
            .await
            .context("failed to count sign-in attempts")?;
        match row {
            Some(row) => {
                let attempts: i64 = row.try_get("attempts")?;
                Ok(u64::try_from(attempts).unwrap_or(0))
            }
            None => Ok(0),
        }
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let query = "DELETE FROM sign_in_attempts WHERE throttle_key = $1";
        sqlx::query(query)
            .bind(key)
            .execute(&self.pool)
            .instrument(query_span("DELETE"))
            .await
            .context("failed to clear sign-in attempts")?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let query = "DELETE FROM sign_in_attempts WHERE expires_at <= NOW()";
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(query_span("DELETE"))
            .await
            .context("failed to purge expired attempts")?;
        Ok(result.rows_affected())
    }
}
