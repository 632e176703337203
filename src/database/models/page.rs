//! `job_pages` table row shape and conversion to `domain::Page`.

use sqlx::FromRow;
use std::str::FromStr;

use crate::database::time;
use crate::domain::page::{Importance, Page, PageStatus};
use crate::error::{Error, Result};

#[derive(Debug, Clone, FromRow)]
pub struct PageRow {
    pub id: String,
    pub job_id: String,
    pub page_id: String,
    pub title: String,
    pub description: Option<String>,
    pub importance: String,
    pub file_paths: String,
    pub related_pages: String,
    pub parent_section: Option<String>,

    pub status: String,
    pub content: Option<String>,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub tokens_used: i64,
    pub generation_time_ms: i64,

    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl TryFrom<PageRow> for Page {
    type Error = Error;

    fn try_from(row: PageRow) -> Result<Self> {
        Ok(Page {
            id: row.id,
            job_id: row.job_id,
            page_id: row.page_id,
            title: row.title,
            description: row.description,
            importance: Importance::from_str(&row.importance).map_err(Error::Database)?,
            file_paths: serde_json::from_str(&row.file_paths).unwrap_or_default(),
            related_pages: serde_json::from_str(&row.related_pages).unwrap_or_default(),
            parent_section: row.parent_section,
            status: PageStatus::from_str(&row.status).map_err(Error::Database)?,
            content: row.content,
            retry_count: row.retry_count as u32,
            last_error: row.last_error,
            tokens_used: row.tokens_used as u64,
            generation_time_ms: row.generation_time_ms as u64,
            created_at: time::parse(&row.created_at)?,
            started_at: time::parse_opt(&row.started_at)?,
            completed_at: time::parse_opt(&row.completed_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn defaults_importance_to_medium_on_empty_parse_failure() {
        let row = PageRow {
            id: "p1".into(),
            job_id: "job-1".into(),
            page_id: "page-1".into(),
            title: "Intro".into(),
            description: None,
            importance: "medium".into(),
            file_paths: "[\"src/main.rs\"]".into(),
            related_pages: "[]".into(),
            parent_section: None,
            status: "pending".into(),
            content: None,
            retry_count: 0,
            last_error: None,
            tokens_used: 0,
            generation_time_ms: 0,
            created_at: Utc::now().to_rfc3339(),
            started_at: None,
            completed_at: None,
        };
        let page: Page = row.try_into().unwrap();
        assert_eq!(page.file_paths, vec!["src/main.rs".to_string()]);
    }
}
