//! Per-user monthly cost budget (spec §4.K): a `(user_id, year_month)` row
//! accumulating estimated USD cost, independent of the token rate limiter.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use sqlx::SqlitePool;

use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct BudgetStatus {
    pub allowed: bool,
    pub used_usd: f64,
    pub limit_usd: Option<f64>,
    pub remaining_usd: Option<f64>,
}

#[async_trait]
pub trait BudgetRepository: Send + Sync {
    /// Checks whether `estimated_cost_usd` would fit within `limit_usd` for
    /// the current calendar month. A `None` or non-positive limit is
    /// unlimited and always allowed.
    async fn check_budget(
        &self,
        user_id: &str,
        estimated_cost_usd: f64,
        limit_usd: Option<f64>,
    ) -> Result<BudgetStatus>;

    async fn log_usage(&self, user_id: &str, cost_usd: f64) -> Result<()>;
}

pub struct SqliteBudgetRepository {
    pool: SqlitePool,
}

impl SqliteBudgetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn current_year_month() -> String {
        let now = Utc::now();
        format!("{:04}-{:02}", now.year(), now.month())
    }

    async fn used_usd(&self, user_id: &str, year_month: &str) -> Result<f64> {
        let used: Option<f64> = sqlx::query_scalar(
            "SELECT used_usd FROM user_monthly_budget WHERE user_id = ? AND year_month = ?",
        )
        .bind(user_id)
        .bind(year_month)
        .fetch_optional(&self.pool)
        .await?;
        Ok(used.unwrap_or(0.0))
    }
}

#[async_trait]
impl BudgetRepository for SqliteBudgetRepository {
    async fn check_budget(
        &self,
        user_id: &str,
        estimated_cost_usd: f64,
        limit_usd: Option<f64>,
    ) -> Result<BudgetStatus> {
        let year_month = Self::current_year_month();
        let used = self.used_usd(user_id, &year_month).await?;

        let Some(limit) = limit_usd.filter(|l| *l > 0.0) else {
            return Ok(BudgetStatus {
                allowed: true,
                used_usd: used,
                limit_usd: None,
                remaining_usd: None,
            });
        };

        let remaining = (limit - used).max(0.0);
        Ok(BudgetStatus {
            allowed: used + estimated_cost_usd <= limit,
            used_usd: used,
            limit_usd: Some(limit),
            remaining_usd: Some(remaining),
        })
    }

    async fn log_usage(&self, user_id: &str, cost_usd: f64) -> Result<()> {
        let year_month = Self::current_year_month();
        sqlx::query(
            r#"
            INSERT INTO user_monthly_budget (user_id, year_month, used_usd, request_count)
            VALUES (?, ?, ?, 1)
            ON CONFLICT(user_id, year_month) DO UPDATE SET
                used_usd = used_usd + excluded.used_usd,
                request_count = request_count + 1
            "#,
        )
        .bind(user_id)
        .bind(&year_month)
        .bind(cost_usd)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO chat_usage_logs (user_id, job_id, cost_usd, created_at) VALUES (?, NULL, ?, ?)",
        )
        .bind(user_id)
        .bind(cost_usd)
        .bind(crate::database::time::now_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
