//! Token Tracker (spec §4.K): per-job running counters for chunking and
//! provider token usage. `provider_total_tokens` is never stored, only
//! derived (see `domain::token_stats`).

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::TokenStatsRow;
use crate::domain::token_stats::TokenStats;
use crate::error::{Error, Result};

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn initialize_job_tokens(&self, job_id: &str) -> Result<()>;
    async fn update_chunking_tokens(&self, job_id: &str, tokens: u64, chunks: u64) -> Result<()>;
    async fn update_provider_tokens(&self, job_id: &str, prompt: u64, completion: u64) -> Result<()>;
    async fn get_job_tokens(&self, job_id: &str) -> Result<TokenStats>;
    async fn reset_job_tokens(&self, job_id: &str) -> Result<()>;
}

pub struct SqliteTokenRepository {
    pool: SqlitePool,
}

impl SqliteTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for SqliteTokenRepository {
    async fn initialize_job_tokens(&self, job_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO job_token_stats (job_id, chunking_total_tokens, \
             chunking_total_chunks, provider_prompt_tokens, provider_completion_tokens) \
             VALUES (?, 0, 0, 0, 0)",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_chunking_tokens(&self, job_id: &str, tokens: u64, chunks: u64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE job_token_stats SET chunking_total_tokens = chunking_total_tokens + ?, \
             chunking_total_chunks = chunking_total_chunks + ? WHERE job_id = ?",
        )
        .bind(tokens as i64)
        .bind(chunks as i64)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("TokenStats", job_id));
        }
        Ok(())
    }

    async fn update_provider_tokens(&self, job_id: &str, prompt: u64, completion: u64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE job_token_stats SET provider_prompt_tokens = provider_prompt_tokens + ?, \
             provider_completion_tokens = provider_completion_tokens + ? WHERE job_id = ?",
        )
        .bind(prompt as i64)
        .bind(completion as i64)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("TokenStats", job_id));
        }
        Ok(())
    }

    async fn get_job_tokens(&self, job_id: &str) -> Result<TokenStats> {
        let row = sqlx::query_as::<_, TokenStatsRow>(
            "SELECT * FROM job_token_stats WHERE job_id = ?",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("TokenStats", job_id))?;
        Ok(row.into())
    }

    async fn reset_job_tokens(&self, job_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE job_token_stats SET chunking_total_tokens = 0, chunking_total_chunks = 0, \
             provider_prompt_tokens = 0, provider_completion_tokens = 0 WHERE job_id = ?",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (SqliteTokenRepository, String) {
        let pool = crate::database::init_pool("sqlite::memory:").await.unwrap();
        crate::database::run_migrations(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO jobs (id, repo_url, repo_type, owner, repo, provider, language, \
             is_comprehensive, status, current_phase, progress_percent, created_at, updated_at) \
             VALUES ('job-1', 'u', 'github', 'o', 'r', 'openai', 'en', 1, 'pending', 0, 0, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();
        let repo = SqliteTokenRepository::new(pool);
        repo.initialize_job_tokens("job-1").await.unwrap();
        (repo, "job-1".to_string())
    }

    #[tokio::test]
    async fn accumulates_across_multiple_updates() {
        let (repo, job_id) = setup().await;
        repo.update_chunking_tokens(&job_id, 100, 5).await.unwrap();
        repo.update_chunking_tokens(&job_id, 50, 2).await.unwrap();
        repo.update_provider_tokens(&job_id, 200, 80).await.unwrap();

        let stats = repo.get_job_tokens(&job_id).await.unwrap();
        assert_eq!(stats.chunking_total_tokens, 150);
        assert_eq!(stats.chunking_total_chunks, 7);
        assert_eq!(stats.provider_total_tokens(), 280);
    }

    #[tokio::test]
    async fn reset_zeroes_all_counters() {
        let (repo, job_id) = setup().await;
        repo.update_chunking_tokens(&job_id, 100, 5).await.unwrap();
        repo.reset_job_tokens(&job_id).await.unwrap();
        let stats = repo.get_job_tokens(&job_id).await.unwrap();
        assert_eq!(stats.chunking_total_tokens, 0);
        assert_eq!(stats.provider_total_tokens(), 0);
    }
}
