//! Wiki cache artifact (spec §6): a JSON snapshot written on terminal job
//! success, mirroring the shape the REST layer serves to its own cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::domain::job::{Job, JobStatus};
use crate::domain::page::Page;
use crate::domain::wiki_structure::WikiStructure;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPage {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    #[serde(rename = "filePaths")]
    pub file_paths: Vec<String>,
    pub importance: String,
    #[serde(rename = "relatedPages")]
    pub related_pages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRepo {
    pub owner: String,
    pub repo: String,
    #[serde(rename = "type")]
    pub repo_type: String,
    #[serde(rename = "repoUrl")]
    pub repo_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiCacheArtifact {
    pub wiki_structure: WikiStructure,
    pub generated_pages: HashMap<String, CachedPage>,
    pub repo: CachedRepo,
    pub provider: String,
    pub model: Option<String>,
}

impl WikiCacheArtifact {
    pub fn build(job: &Job, structure: &WikiStructure, pages: &[Page]) -> Self {
        let generated_pages = pages
            .iter()
            .map(|page| {
                (
                    page.page_id.clone(),
                    CachedPage {
                        id: page.page_id.clone(),
                        title: page.title.clone(),
                        content: page.content.clone(),
                        file_paths: page.file_paths.clone(),
                        importance: page.importance.to_string(),
                        related_pages: page.related_pages.clone(),
                    },
                )
            })
            .collect();

        Self {
            wiki_structure: structure.clone(),
            generated_pages,
            repo: CachedRepo {
                owner: job.owner.clone(),
                repo: job.repo.clone(),
                repo_type: job.repo_type.to_string(),
                repo_url: job.repo_url.clone(),
            },
            provider: job.provider.clone(),
            model: job.model.clone(),
        }
    }
}

/// Filename for a job's cache artifact (spec §6).
pub fn cache_file_name(job: &Job) -> String {
    format!("deepwiki_cache_{}_{}_{}_{}.json", job.repo_type, job.owner, job.repo, job.language)
}

/// Writes the artifact for `job` under `<data_root>/wikicache/`. Only
/// called at terminal success (`completed` or `partially_completed`); the
/// caller is responsible for checking `job.status` before calling.
pub async fn persist(data_root: &Path, job: &Job, structure: &WikiStructure, pages: &[Page]) -> Result<PathBuf> {
    debug_assert!(matches!(job.status, JobStatus::Completed | JobStatus::PartiallyCompleted));

    let dir = data_root.join("wikicache");
    fs::create_dir_all(&dir).await?;

    let artifact = WikiCacheArtifact::build(job, structure, pages);
    let json = serde_json::to_vec_pretty(&artifact)?;

    let path = dir.join(cache_file_name(job));
    fs::write(&path, json).await.map_err(Error::Io)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::{PathFilters, RepoType};
    use crate::domain::page::{Importance, PageStatus};
    use chrono::Utc;

    fn sample_job() -> Job {
        Job {
            id: "job-1".into(),
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
            status: JobStatus::Completed,
            current_phase: 2,
            progress_percent: 100,
            error_message: None,
            total_pages: 1,
            completed_pages: 1,
            failed_pages: 0,
            total_tokens_used: 500,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            updated_at: Utc::now(),
            wiki_structure: None,
        }
    }

    fn sample_page() -> Page {
        Page {
            id: "row-1".into(),
            job_id: "job-1".into(),
            page_id: "p1".into(),
            title: "Overview".into(),
            description: None,
            importance: Importance::High,
            file_paths: vec!["src/lib.rs".into()],
            related_pages: vec![],
            parent_section: None,
            status: PageStatus::Completed,
            content: Some("# Overview".into()),
            retry_count: 0,
            last_error: None,
            tokens_used: 120,
            generation_time_ms: 400,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn cache_file_name_matches_the_documented_pattern() {
        let job = sample_job();
        assert_eq!(cache_file_name(&job), "deepwiki_cache_github_a_b_en.json");
    }

    #[tokio::test]
    async fn persist_writes_a_readable_json_artifact() {
        let dir = std::env::temp_dir().join(format!("deepwiki-test-{}", uuid::Uuid::new_v4()));
        let job = sample_job();
        let structure = WikiStructure {
            title: "b".into(),
            description: "d".into(),
            pages: vec![],
            sections: vec![],
        };
        let path = persist(&dir, &job, &structure, &[sample_page()]).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: WikiCacheArtifact = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.generated_pages.get("p1").unwrap().title, "Overview");
        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
