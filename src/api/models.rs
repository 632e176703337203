//! Request/response bodies for the job REST surface (spec §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::repositories::{JobDetail, JobFilters, Pagination};
use crate::domain::job::{Job, JobStatus, PathFilters, RepoType};
use crate::domain::page::Page;
use crate::domain::token_stats::TokenStats;

#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    pub repo_url: String,
    pub repo_type: String,
    pub owner: String,
    pub repo: String,
    pub access_token: Option<String>,
    #[serde(default)]
    pub excluded_dirs: Vec<String>,
    #[serde(default)]
    pub excluded_files: Vec<String>,
    #[serde(default)]
    pub included_dirs: Vec<String>,
    #[serde(default)]
    pub included_files: Vec<String>,
    pub provider: String,
    pub model: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub is_comprehensive: bool,
    pub client_id: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

impl CreateJobBody {
    pub fn into_request(self) -> Result<crate::database::repositories::CreateJobRequest, String> {
        let repo_type: RepoType = self.repo_type.parse()?;
        Ok(crate::database::repositories::CreateJobRequest {
            repo_url: self.repo_url,
            repo_type,
            owner: self.owner,
            repo: self.repo,
            access_token: self.access_token,
            filters: PathFilters {
                excluded_dirs: self.excluded_dirs,
                excluded_files: self.excluded_files,
                included_dirs: self.included_dirs,
                included_files: self.included_files,
            },
            provider: self.provider,
            model: self.model,
            language: self.language,
            is_comprehensive: self.is_comprehensive,
            client_id: self.client_id,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: String,
    pub repo_url: String,
    pub repo_type: String,
    pub owner: String,
    pub repo: String,
    pub provider: String,
    pub model: Option<String>,
    pub language: String,
    pub is_comprehensive: bool,
    pub status: String,
    pub current_phase: u8,
    pub progress_percent: u8,
    pub error_message: Option<String>,
    pub total_pages: u32,
    pub completed_pages: u32,
    pub failed_pages: u32,
    pub total_tokens_used: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            repo_url: job.repo_url.clone(),
            repo_type: job.repo_type.to_string(),
            owner: job.owner.clone(),
            repo: job.repo.clone(),
            provider: job.provider.clone(),
            model: job.model.clone(),
            language: job.language.clone(),
            is_comprehensive: job.is_comprehensive,
            status: job.status.to_string(),
            current_phase: job.current_phase,
            progress_percent: job.progress_percent,
            error_message: job.error_message.clone(),
            total_pages: job.total_pages,
            completed_pages: job.completed_pages,
            failed_pages: job.failed_pages,
            total_tokens_used: job.total_tokens_used,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PageView {
    pub page_id: String,
    pub title: String,
    pub importance: String,
    pub status: String,
    pub file_paths: Vec<String>,
    pub related_pages: Vec<String>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub tokens_used: u64,
}

impl From<&Page> for PageView {
    fn from(page: &Page) -> Self {
        Self {
            page_id: page.page_id.clone(),
            title: page.title.clone(),
            importance: page.importance.to_string(),
            status: page.status.to_string(),
            file_paths: page.file_paths.clone(),
            related_pages: page.related_pages.clone(),
            retry_count: page.retry_count,
            last_error: page.last_error.clone(),
            tokens_used: page.tokens_used,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenSummaryView {
    pub chunking_total_tokens: u64,
    pub chunking_total_chunks: u64,
    pub provider_prompt_tokens: u64,
    pub provider_completion_tokens: u64,
    pub provider_total_tokens: u64,
}

impl From<TokenStats> for TokenSummaryView {
    fn from(stats: TokenStats) -> Self {
        Self {
            chunking_total_tokens: stats.chunking_total_tokens,
            chunking_total_chunks: stats.chunking_total_chunks,
            provider_prompt_tokens: stats.provider_prompt_tokens,
            provider_completion_tokens: stats.provider_completion_tokens,
            provider_total_tokens: stats.provider_total_tokens(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobDetailView {
    #[serde(flatten)]
    pub job: JobView,
    pub pages: Vec<PageView>,
    pub token_summary: Option<TokenSummaryView>,
}

impl JobDetailView {
    pub fn from_detail(detail: &JobDetail, token_summary: Option<TokenStats>) -> Self {
        Self {
            job: JobView::from(&detail.job),
            pages: detail.pages.iter().map(PageView::from).collect(),
            token_summary: token_summary.map(TokenSummaryView::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobView>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// Query parameters for `GET /jobs` (spec §6, max 100 per page).
#[derive(Debug, Deserialize, Default)]
pub struct JobListQuery {
    pub status: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub provider: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl JobListQuery {
    pub fn into_filters_and_pagination(self) -> Result<(JobFilters, Pagination), String> {
        let status = self.status.map(|s| s.parse::<JobStatus>()).transpose()?;
        let filters = JobFilters { status, owner: self.owner, repo: self.repo, provider: self.provider };
        let pagination =
            Pagination { limit: self.limit.unwrap_or(100).min(100), offset: self.offset.unwrap_or(0) };
        Ok((filters, pagination))
    }
}
