//! Per-user sliding-window rate limiter (spec §4.K), backed by a
//! timestamp table rather than an in-memory token bucket so limits survive
//! a restart and are shared across worker processes.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::Result;

const WINDOW_SECS: i64 = 60;

#[async_trait]
pub trait RateLimitRepository: Send + Sync {
    /// Returns `true` if the request is admitted under `limit_per_minute`.
    /// A `None` or non-positive limit means unlimited.
    async fn check_and_record(&self, user_id: &str, limit_per_minute: Option<i64>) -> Result<bool>;
}

pub struct SqliteRateLimitRepository {
    pool: SqlitePool,
}

impl SqliteRateLimitRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitRepository for SqliteRateLimitRepository {
    async fn check_and_record(&self, user_id: &str, limit_per_minute: Option<i64>) -> Result<bool> {
        let Some(limit) = limit_per_minute.filter(|l| *l > 0) else {
            return Ok(true);
        };

        let mut tx = self.pool.begin().await?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let window_start_ms = now_ms - WINDOW_SECS * 1000;

        sqlx::query("DELETE FROM rate_limit_tracker WHERE user_id = ? AND requested_at_ms < ?")
            .bind(user_id)
            .bind(window_start_ms)
            .execute(&mut *tx)
            .await?;

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM rate_limit_tracker WHERE user_id = ? AND requested_at_ms >= ?",
        )
        .bind(user_id)
        .bind(window_start_ms)
        .fetch_one(&mut *tx)
        .await?;

        if count >= limit {
            tx.commit().await?;
            return Ok(false);
        }

        sqlx::query("INSERT INTO rate_limit_tracker (user_id, requested_at_ms) VALUES (?, ?)")
            .bind(user_id)
            .bind(now_ms)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
