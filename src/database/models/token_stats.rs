//! `job_token_stats` table row shape.

use sqlx::FromRow;

use crate::domain::token_stats::TokenStats;

#[derive(Debug, Clone, FromRow)]
pub struct TokenStatsRow {
    pub job_id: String,
    pub chunking_total_tokens: i64,
    pub chunking_total_chunks: i64,
    pub provider_prompt_tokens: i64,
    pub provider_completion_tokens: i64,
}

impl From<TokenStatsRow> for TokenStats {
    fn from(row: TokenStatsRow) -> Self {
        TokenStats {
            chunking_total_tokens: row.chunking_total_tokens as u64,
            chunking_total_chunks: row.chunking_total_chunks as u64,
            provider_prompt_tokens: row.provider_prompt_tokens as u64,
            provider_completion_tokens: row.provider_completion_tokens as u64,
        }
    }
}
