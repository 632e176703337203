//! Job Manager (spec §4.B): CRUD over jobs/pages, state transitions,
//! idempotent creation, atomic counters. The Job Manager exclusively
//! mutates `jobs` and `job_pages` rows (spec §3 ownership).

use async_trait::async_trait;
use rand::random;
use sqlx::SqlitePool;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use crate::database::models::{JobRow, PageRow};
use crate::database::time;
use crate::domain::job::{Job, JobStatus, PathFilters, RepoType};
use crate::domain::page::{Importance, Page, PageStatus, MAX_PAGE_RETRIES};
use crate::error::{Error, Result};

const SQLITE_BUSY_MAX_RETRIES: usize = 8;
const SQLITE_BUSY_BASE_DELAY_MS: u64 = 10;
const SQLITE_BUSY_MAX_DELAY_MS: u64 = 250;

fn is_sqlite_busy_error(err: &Error) -> bool {
    let Error::DatabaseSqlx(sqlx::Error::Database(db_err)) = err else {
        return false;
    };
    let msg = db_err.message().to_ascii_lowercase();
    msg.contains("database is locked") || msg.contains("database is busy")
}

async fn retry_on_sqlite_busy<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_sqlite_busy_error(&err) || attempt >= SQLITE_BUSY_MAX_RETRIES {
                    return Err(err);
                }
                let exp_ms = SQLITE_BUSY_BASE_DELAY_MS.saturating_mul(1u64 << attempt);
                let capped_ms = exp_ms.min(SQLITE_BUSY_MAX_DELAY_MS);
                let jitter_ms = (random::<u64>() % (capped_ms / 4 + 1)).min(SQLITE_BUSY_MAX_DELAY_MS);
                debug!(op_name, attempt, "sqlite busy, retrying");
                sleep(Duration::from_millis(capped_ms + jitter_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Request to create a job (spec §3 Inputs).
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub repo_url: String,
    pub repo_type: RepoType,
    pub owner: String,
    pub repo: String,
    pub access_token: Option<String>,
    pub filters: PathFilters,
    pub provider: String,
    pub model: Option<String>,
    pub language: String,
    pub is_comprehensive: bool,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilters {
    pub status: Option<JobStatus>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { limit: 100, offset: 0 }
    }
}

/// A page description as produced by the wiki structure generator, used to
/// seed `job_pages` rows in `set_wiki_structure`.
#[derive(Debug, Clone)]
pub struct NewPage {
    pub page_id: String,
    pub title: String,
    pub description: Option<String>,
    pub importance: Importance,
    pub file_paths: Vec<String>,
    pub related_pages: Vec<String>,
    pub parent_section: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobDetail {
    pub job: Job,
    pub pages: Vec<Page>,
}

/// Job Manager trait (spec §4.B). All operations are asynchronous and
/// return the effective row or a boolean success ("test-and-set").
#[async_trait]
pub trait JobManager: Send + Sync {
    async fn create_job(&self, req: CreateJobRequest) -> Result<String>;
    async fn get_job(&self, id: &str) -> Result<Job>;
    async fn get_job_detail(&self, id: &str) -> Result<JobDetail>;
    async fn list_jobs(&self, filters: &JobFilters, pagination: Pagination) -> Result<Vec<Job>>;
    async fn count_jobs(&self, filters: &JobFilters) -> Result<u64>;

    async fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
        phase: Option<u8>,
        progress: Option<u8>,
        error: Option<&str>,
    ) -> Result<()>;

    async fn set_wiki_structure(
        &self,
        id: &str,
        structure_json: &str,
        pages: Vec<NewPage>,
    ) -> Result<()>;

    async fn get_next_pending_page(&self, job_id: &str) -> Result<Option<Page>>;
    async fn get_failed_pages(&self, job_id: &str) -> Result<Vec<Page>>;

    async fn update_page_status(
        &self,
        page_id: &str,
        status: PageStatus,
        content: Option<&str>,
        tokens: Option<u64>,
        time_ms: Option<u64>,
        error: Option<&str>,
    ) -> Result<()>;

    async fn increment_job_page_count(
        &self,
        id: &str,
        completed: u32,
        failed: u32,
        tokens: u64,
    ) -> Result<()>;

    async fn pause_job(&self, id: &str) -> Result<bool>;
    async fn resume_job(&self, id: &str) -> Result<bool>;
    async fn cancel_job(&self, id: &str) -> Result<bool>;
    async fn retry_job(&self, id: &str) -> Result<bool>;
    async fn retry_failed_page(&self, job_id: &str, page_id: &str) -> Result<bool>;
    async fn reset_stuck_pages(&self, job_id: &str) -> Result<u64>;
    async fn delete_job(&self, id: &str) -> Result<bool>;

    async fn get_pending_jobs(&self) -> Result<Vec<Job>>;
}

pub struct SqliteJobManager {
    pool: SqlitePool,
}

impl SqliteJobManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_active_job_id(
        &self,
        owner: &str,
        repo: &str,
        language: &str,
        provider: &str,
        model: Option<&str>,
    ) -> Result<Option<String>> {
        let active_statuses = [
            "pending",
            "preparing_embeddings",
            "generating_structure",
            "generating_pages",
            "paused",
        ];
        let placeholders = active_statuses.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT id FROM jobs WHERE owner = ? AND repo = ? AND language = ? AND provider = ? \
             AND (model IS ? OR model = ?) AND status IN ({placeholders})"
        );
        let mut query = sqlx::query_scalar::<_, String>(&sql)
            .bind(owner)
            .bind(repo)
            .bind(language)
            .bind(provider)
            .bind(model)
            .bind(model);
        for s in active_statuses {
            query = query.bind(s);
        }
        Ok(query.fetch_optional(&self.pool).await?)
    }

    async fn load_page(&self, page_id: &str) -> Result<Page> {
        let row = sqlx::query_as::<_, PageRow>("SELECT * FROM job_pages WHERE id = ?")
            .bind(page_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Page", page_id))?;
        row.try_into()
    }
}

#[async_trait]
impl JobManager for SqliteJobManager {
    async fn create_job(&self, req: CreateJobRequest) -> Result<String> {
        if let Some(existing) = self
            .find_active_job_id(&req.owner, &req.repo, &req.language, &req.provider, req.model.as_deref())
            .await?
        {
            debug!(job_id = %existing, "returning existing active job (idempotent creation)");
            return Ok(existing);
        }

        let id = Uuid::new_v4().to_string();
        let now = time::now_string();
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, repo_url, repo_type, owner, repo, access_token,
                excluded_dirs, excluded_files, included_dirs, included_files,
                provider, model, language, is_comprehensive, client_id,
                status, current_phase, progress_percent,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&req.repo_url)
        .bind(req.repo_type.to_string())
        .bind(&req.owner)
        .bind(&req.repo)
        .bind(&req.access_token)
        .bind(serde_json::to_string(&req.filters.excluded_dirs)?)
        .bind(serde_json::to_string(&req.filters.excluded_files)?)
        .bind(serde_json::to_string(&req.filters.included_dirs)?)
        .bind(serde_json::to_string(&req.filters.included_files)?)
        .bind(&req.provider)
        .bind(&req.model)
        .bind(&req.language)
        .bind(req.is_comprehensive)
        .bind(&req.client_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO job_token_stats (job_id, chunking_total_tokens, chunking_total_chunks, \
             provider_prompt_tokens, provider_completion_tokens) VALUES (?, 0, 0, 0, 0)",
        )
        .bind(&id)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_job(&self, id: &str) -> Result<Job> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))?;
        row.try_into()
    }

    async fn get_job_detail(&self, id: &str) -> Result<JobDetail> {
        let job = self.get_job(id).await?;
        let rows = sqlx::query_as::<_, PageRow>(
            "SELECT * FROM job_pages WHERE job_id = ? ORDER BY page_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        let pages = rows
            .into_iter()
            .map(Page::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(JobDetail { job, pages })
    }

    async fn list_jobs(&self, filters: &JobFilters, pagination: Pagination) -> Result<Vec<Job>> {
        let mut sql = String::from("SELECT * FROM jobs WHERE 1=1");
        if filters.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filters.owner.is_some() {
            sql.push_str(" AND owner = ?");
        }
        if filters.repo.is_some() {
            sql.push_str(" AND repo = ?");
        }
        if filters.provider.is_some() {
            sql.push_str(" AND provider = ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, JobRow>(&sql);
        if let Some(status) = filters.status {
            query = query.bind(status.to_string());
        }
        if let Some(owner) = &filters.owner {
            query = query.bind(owner);
        }
        if let Some(repo) = &filters.repo {
            query = query.bind(repo);
        }
        if let Some(provider) = &filters.provider {
            query = query.bind(provider);
        }
        let limit = pagination.limit.min(100);
        let rows = query
            .bind(limit)
            .bind(pagination.offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    async fn count_jobs(&self, filters: &JobFilters) -> Result<u64> {
        let mut sql = String::from("SELECT COUNT(*) FROM jobs WHERE 1=1");
        if filters.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filters.owner.is_some() {
            sql.push_str(" AND owner = ?");
        }
        if filters.repo.is_some() {
            sql.push_str(" AND repo = ?");
        }
        if filters.provider.is_some() {
            sql.push_str(" AND provider = ?");
        }
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(status) = filters.status {
            query = query.bind(status.to_string());
        }
        if let Some(owner) = &filters.owner {
            query = query.bind(owner);
        }
        if let Some(repo) = &filters.repo {
            query = query.bind(repo);
        }
        if let Some(provider) = &filters.provider {
            query = query.bind(provider);
        }
        Ok(query.fetch_one(&self.pool).await? as u64)
    }

    async fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
        phase: Option<u8>,
        progress: Option<u8>,
        error: Option<&str>,
    ) -> Result<()> {
        retry_on_sqlite_busy("update_job_status", || async {
            let now = time::now_string();
            let started_at = if status == JobStatus::PreparingEmbeddings {
                Some(now.clone())
            } else {
                None
            };
            let completed_at = if status.is_terminal() { Some(now.clone()) } else { None };

            sqlx::query(
                r#"
                UPDATE jobs SET
                    status = ?,
                    current_phase = COALESCE(?, current_phase),
                    progress_percent = COALESCE(?, progress_percent),
                    error_message = COALESCE(?, error_message),
                    started_at = COALESCE(?, started_at),
                    completed_at = COALESCE(?, completed_at),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(status.to_string())
            .bind(phase.map(|p| p as i64))
            .bind(progress.map(|p| p as i64))
            .bind(error)
            .bind(started_at)
            .bind(completed_at)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn set_wiki_structure(
        &self,
        id: &str,
        structure_json: &str,
        pages: Vec<NewPage>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = time::now_string();

        sqlx::query("UPDATE jobs SET wiki_structure = ?, total_pages = ?, updated_at = ? WHERE id = ?")
            .bind(structure_json)
            .bind(pages.len() as i64)
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for page in &pages {
            let page_row_id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO job_pages (
                    id, job_id, page_id, title, description, importance,
                    file_paths, related_pages, parent_section, status, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)
                "#,
            )
            .bind(&page_row_id)
            .bind(id)
            .bind(&page.page_id)
            .bind(&page.title)
            .bind(&page.description)
            .bind(page.importance.to_string())
            .bind(serde_json::to_string(&page.file_paths)?)
            .bind(serde_json::to_string(&page.related_pages)?)
            .bind(&page.parent_section)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_next_pending_page(&self, job_id: &str) -> Result<Option<Page>> {
        let row = sqlx::query_as::<_, PageRow>(
            "SELECT * FROM job_pages WHERE job_id = ? AND status = 'pending' ORDER BY page_id LIMIT 1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Page::try_from).transpose()
    }

    async fn get_failed_pages(&self, job_id: &str) -> Result<Vec<Page>> {
        let rows = sqlx::query_as::<_, PageRow>(
            "SELECT * FROM job_pages WHERE job_id = ? AND status = 'failed' ORDER BY page_id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Page::try_from).collect()
    }

    async fn update_page_status(
        &self,
        page_id: &str,
        status: PageStatus,
        content: Option<&str>,
        tokens: Option<u64>,
        time_ms: Option<u64>,
        error: Option<&str>,
    ) -> Result<()> {
        retry_on_sqlite_busy("update_page_status", || async {
            let now = time::now_string();
            let started_at = if status == PageStatus::InProgress { Some(now.clone()) } else { None };
            let completed_at =
                if matches!(status, PageStatus::Completed | PageStatus::PermanentFailed) {
                    Some(now.clone())
                } else {
                    None
                };
            let retry_increment = if error.is_some() { 1 } else { 0 };

            sqlx::query(
                r#"
                UPDATE job_pages SET
                    status = ?,
                    content = COALESCE(?, content),
                    tokens_used = COALESCE(?, tokens_used),
                    generation_time_ms = COALESCE(?, generation_time_ms),
                    last_error = COALESCE(?, last_error),
                    retry_count = retry_count + ?,
                    started_at = COALESCE(?, started_at),
                    completed_at = COALESCE(?, completed_at)
                WHERE id = ?
                "#,
            )
            .bind(status.to_string())
            .bind(content)
            .bind(tokens.map(|t| t as i64))
            .bind(time_ms.map(|t| t as i64))
            .bind(error)
            .bind(retry_increment)
            .bind(started_at)
            .bind(completed_at)
            .bind(page_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn increment_job_page_count(
        &self,
        id: &str,
        completed: u32,
        failed: u32,
        tokens: u64,
    ) -> Result<()> {
        let now = time::now_string();
        sqlx::query(
            "UPDATE jobs SET completed_pages = completed_pages + ?, failed_pages = failed_pages + ?, \
             total_tokens_used = total_tokens_used + ?, updated_at = ? WHERE id = ?",
        )
        .bind(completed as i64)
        .bind(failed as i64)
        .bind(tokens as i64)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pause_job(&self, id: &str) -> Result<bool> {
        let now = time::now_string();
        let result = sqlx::query(
            "UPDATE jobs SET status = 'paused', updated_at = ? WHERE id = ? AND status IN \
             ('preparing_embeddings', 'generating_structure', 'generating_pages')",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn resume_job(&self, id: &str) -> Result<bool> {
        // Resume returns to whichever phase was paused, not always
        // generating_pages: a pause during embedding or structure generation
        // must not skip straight to page generation.
        let now = time::now_string();
        let result = sqlx::query(
            "UPDATE jobs SET status = CASE current_phase \
             WHEN 0 THEN 'preparing_embeddings' \
             WHEN 1 THEN 'generating_structure' \
             ELSE 'generating_pages' END, \
             updated_at = ? WHERE id = ? AND status = 'paused'",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn cancel_job(&self, id: &str) -> Result<bool> {
        let now = time::now_string();
        let result = sqlx::query(
            "UPDATE jobs SET status = 'cancelled', completed_at = ?, updated_at = ? WHERE id = ? \
             AND status NOT IN ('completed', 'partially_completed', 'cancelled', 'failed')",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn retry_job(&self, id: &str) -> Result<bool> {
        let now = time::now_string();
        let result = sqlx::query(
            "UPDATE jobs SET status = 'generating_pages', error_message = NULL, completed_at = NULL, \
             updated_at = ? WHERE id = ? AND status IN ('failed', 'completed', 'partially_completed')",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn retry_failed_page(&self, job_id: &str, page_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE job_pages SET status = 'pending', last_error = NULL WHERE job_id = ? AND page_id = ? \
             AND status IN ('failed', 'permanent_failed')",
        )
        .bind(job_id)
        .bind(page_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() != 1 {
            return Ok(false);
        }
        // Re-open the job if it had already reached a terminal state.
        self.retry_job(job_id).await.ok();
        Ok(true)
    }

    async fn reset_stuck_pages(&self, job_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE job_pages SET status = 'pending', started_at = NULL WHERE job_id = ? AND status = 'in_progress'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_job(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_pending_jobs(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE status IN \
             ('pending', 'preparing_embeddings', 'generating_structure', 'generating_pages') \
             ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Job::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> SqliteJobManager {
        let pool = crate::database::init_pool("sqlite::memory:").await.unwrap();
        crate::database::run_migrations(&pool).await.unwrap();
        SqliteJobManager::new(pool)
    }

    fn sample_request() -> CreateJobRequest {
        CreateJobRequest {
            repo_url: "https://github.com/a/b".into(),
            repo_type: RepoType::Github,
            owner: "a".into(),
            repo: "b".into(),
            access_token: None,
            filters: PathFilters::default(),
            provider: "openai".into(),
            model: Some("gpt-4o".into()),
            language: "en".into(),
            is_comprehensive: true,
            client_id: None,
        }
    }

    #[tokio::test]
    async fn create_job_is_idempotent_for_active_jobs() {
        let mgr = setup().await;
        let id1 = mgr.create_job(sample_request()).await.unwrap();
        let id2 = mgr.create_job(sample_request()).await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn create_job_allows_new_job_after_terminal_status() {
        let mgr = setup().await;
        let id1 = mgr.create_job(sample_request()).await.unwrap();
        mgr.update_job_status(&id1, JobStatus::Completed, None, None, None)
            .await
            .unwrap();
        let id2 = mgr.create_job(sample_request()).await.unwrap();
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn set_wiki_structure_then_get_detail_preserves_page_order() {
        let mgr = setup().await;
        let id = mgr.create_job(sample_request()).await.unwrap();
        let pages = vec![
            NewPage {
                page_id: "page-1".into(),
                title: "Intro".into(),
                description: None,
                importance: Importance::High,
                file_paths: vec!["src/lib.rs".into()],
                related_pages: vec![],
                parent_section: None,
            },
            NewPage {
                page_id: "page-2".into(),
                title: "Usage".into(),
                description: None,
                importance: Importance::Medium,
                file_paths: vec![],
                related_pages: vec![],
                parent_section: None,
            },
        ];
        mgr.set_wiki_structure(&id, "{}", pages).await.unwrap();
        let detail = mgr.get_job_detail(&id).await.unwrap();
        assert_eq!(detail.pages.len(), 2);
        assert_eq!(detail.job.total_pages, 2);
        assert_eq!(detail.pages[0].page_id, "page-1");
    }

    #[tokio::test]
    async fn cancel_is_idempotent_on_its_terminal_target() {
        let mgr = setup().await;
        let id = mgr.create_job(sample_request()).await.unwrap();
        assert!(mgr.cancel_job(&id).await.unwrap());
        // second cancel is a no-op: job is already cancelled, not a matching precondition
        assert!(!mgr.cancel_job(&id).await.unwrap());
        let job = mgr.get_job(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn page_retry_count_promotes_to_permanent_failed() {
        let mgr = setup().await;
        let id = mgr.create_job(sample_request()).await.unwrap();
        mgr.set_wiki_structure(
            &id,
            "{}",
            vec![NewPage {
                page_id: "page-1".into(),
                title: "Intro".into(),
                description: None,
                importance: Importance::High,
                file_paths: vec![],
                related_pages: vec![],
                parent_section: None,
            }],
        )
        .await
        .unwrap();
        let page = mgr.get_next_pending_page(&id).await.unwrap().unwrap();
        for i in 0..MAX_PAGE_RETRIES {
            let status = Page::status_after_failure(i + 1);
            mgr.update_page_status(&page.id, status, None, None, None, Some("boom"))
                .await
                .unwrap();
        }
        let failed = mgr.get_failed_pages(&id).await.unwrap();
        assert!(failed.is_empty(), "page should have moved past `failed` into `permanent_failed`");
    }

    #[tokio::test]
    async fn reset_stuck_pages_requeues_in_progress_rows() {
        let mgr = setup().await;
        let id = mgr.create_job(sample_request()).await.unwrap();
        mgr.set_wiki_structure(
            &id,
            "{}",
            vec![NewPage {
                page_id: "page-1".into(),
                title: "Intro".into(),
                description: None,
                importance: Importance::High,
                file_paths: vec![],
                related_pages: vec![],
                parent_section: None,
            }],
        )
        .await
        .unwrap();
        let page = mgr.get_next_pending_page(&id).await.unwrap().unwrap();
        mgr.update_page_status(&page.id, PageStatus::InProgress, None, None, None, None)
            .await
            .unwrap();
        let reset = mgr.reset_stuck_pages(&id).await.unwrap();
        assert_eq!(reset, 1);
        let pending = mgr.get_next_pending_page(&id).await.unwrap();
        assert!(pending.is_some());
    }
}
