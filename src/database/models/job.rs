//! `jobs` table row shape and conversion to `domain::Job`.

use sqlx::FromRow;
use std::str::FromStr;

use crate::database::time;
use crate::domain::job::{Job, JobStatus, PathFilters, RepoType};
use crate::error::{Error, Result};

#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: String,
    pub repo_url: String,
    pub repo_type: String,
    pub owner: String,
    pub repo: String,
    pub access_token: Option<String>,
    pub excluded_dirs: String,
    pub excluded_files: String,
    pub included_dirs: String,
    pub included_files: String,
    pub provider: String,
    pub model: Option<String>,
    pub language: String,
    pub is_comprehensive: bool,
    pub client_id: Option<String>,

    pub status: String,
    pub current_phase: i64,
    pub progress_percent: i64,
    pub error_message: Option<String>,
    pub total_pages: i64,
    pub completed_pages: i64,
    pub failed_pages: i64,
    pub total_tokens_used: i64,

    pub wiki_structure: Option<String>,

    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub updated_at: String,
}

fn json_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

impl TryFrom<JobRow> for Job {
    type Error = Error;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Job {
            id: row.id,
            repo_url: row.repo_url,
            repo_type: RepoType::from_str(&row.repo_type).map_err(Error::Database)?,
            owner: row.owner,
            repo: row.repo,
            access_token: row.access_token,
            filters: PathFilters {
                excluded_dirs: json_list(&row.excluded_dirs),
                excluded_files: json_list(&row.excluded_files),
                included_dirs: json_list(&row.included_dirs),
                included_files: json_list(&row.included_files),
            },
            provider: row.provider,
            model: row.model,
            language: row.language,
            is_comprehensive: row.is_comprehensive,
            client_id: row.client_id,
            status: JobStatus::from_str(&row.status).map_err(Error::Database)?,
            current_phase: row.current_phase as u8,
            progress_percent: row.progress_percent as u8,
            error_message: row.error_message,
            total_pages: row.total_pages as u32,
            completed_pages: row.completed_pages as u32,
            failed_pages: row.failed_pages as u32,
            total_tokens_used: row.total_tokens_used as u64,
            created_at: time::parse(&row.created_at)?,
            started_at: time::parse_opt(&row.started_at)?,
            completed_at: time::parse_opt(&row.completed_at)?,
            updated_at: time::parse(&row.updated_at)?,
            wiki_structure: row.wiki_structure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_row() -> JobRow {
        JobRow {
            id: "job-1".into(),
            repo_url: "https://github.com/a/b".into(),
            repo_type: "github".into(),
            owner: "a".into(),
            repo: "b".into(),
            access_token: None,
            excluded_dirs: "[\"node_modules\"]".into(),
            excluded_files: "[]".into(),
            included_dirs: "[]".into(),
            included_files: "[]".into(),
            provider: "openai".into(),
            model: Some("gpt-4o".into()),
            language: "en".into(),
            is_comprehensive: true,
            client_id: None,
            status: "pending".into(),
            current_phase: 0,
            progress_percent: 0,
            error_message: None,
            total_pages: 0,
            completed_pages: 0,
            failed_pages: 0,
            total_tokens_used: 0,
            wiki_structure: None,
            created_at: Utc::now().to_rfc3339(),
            started_at: None,
            completed_at: None,
            updated_at: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn converts_json_filter_lists() {
        let job: Job = sample_row().try_into().unwrap();
        assert_eq!(job.filters.excluded_dirs, vec!["node_modules".to_string()]);
    }
}
