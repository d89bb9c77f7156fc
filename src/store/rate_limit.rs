use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::time::Duration;
use tracing::{debug, warn, Instrument};

use super::{interval, map_sqlx_error};
use crate::auth::{RateLimitEntry, RateLimitStore, StoreError};

/// Expired rows deleted per increment.
const PRUNE_BATCH: i64 = 500;

/// Rate-limit entries shared by every instance pointed at the same database.
#[derive(Clone, Debug)]
pub struct PgRateLimitStore {
    pool: PgPool,
    window: Duration,
}

impl PgRateLimitStore {
    #[must_use]
    pub fn new(pool: PgPool, window: Duration) -> Self {
        Self { pool, window }
    }

    /// Delete a batch of rows whose window has elapsed.
    ///
    /// Rows locked by concurrent increments are skipped.
    async fn prune_expired(&self) -> Result<u64, StoreError> {
        let query = r"
            DELETE FROM login_rate_limits
            WHERE identity IN (
                SELECT identity FROM login_rate_limits
                WHERE window_start <= NOW() - $1::interval
                ORDER BY window_start
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(interval(self.window))
            .bind(PRUNE_BATCH)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

fn entry_from_row(row: &PgRow) -> Result<RateLimitEntry, StoreError> {
    let count: i32 = row.get("failure_count");
    Ok(RateLimitEntry {
        identity: row.get("identity"),
        failure_count: u32::try_from(count)
            .map_err(|_| StoreError::Unavailable(format!("negative failure count: {count}")))?,
        window_start: row.get("window_start"),
    })
}

#[async_trait]
impl RateLimitStore for PgRateLimitStore {
    async fn get(&self, identity: &str) -> Result<Option<RateLimitEntry>, StoreError> {
        let query = r"
            SELECT identity, failure_count, window_start
            FROM login_rate_limits
            WHERE identity = $1 AND window_start > NOW() - $2::interval
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identity)
            .bind(interval(self.window))
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn increment(&self, identity: &str) -> Result<RateLimitEntry, StoreError> {
        // Single statement so concurrent failures for one identity serialize on the row lock.
        let query = r"
            INSERT INTO login_rate_limits (identity, failure_count, window_start)
            VALUES ($1, 1, NOW())
            ON CONFLICT (identity) DO UPDATE SET
                failure_count = CASE
                    WHEN login_rate_limits.window_start <= NOW() - $2::interval THEN 1
                    ELSE LEAST(login_rate_limits.failure_count, 2147483646) + 1
                END,
                window_start = CASE
                    WHEN login_rate_limits.window_start <= NOW() - $2::interval THEN NOW()
                    ELSE login_rate_limits.window_start
                END
            RETURNING identity, failure_count, window_start
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identity)
            .bind(interval(self.window))
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(map_sqlx_error)?;
        let entry = entry_from_row(&row)?;

        match self.prune_expired().await {
            Ok(0) => {}
            Ok(pruned) => debug!(pruned, "Pruned expired rate-limit entries"),
            Err(err) => warn!("Failed to prune expired rate-limit entries: {err}"),
        }

        Ok(entry)
    }

    async fn clear(&self, identity: &str) -> Result<(), StoreError> {
        let query = "DELETE FROM login_rate_limits WHERE identity = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(identity)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
