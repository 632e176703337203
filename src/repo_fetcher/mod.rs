//! Repo Fetcher (spec §1 scope boundary): cloning a repository, walking its
//! file tree, and reading file contents is explicitly out of core scope —
//! this trait is the seam an external crate or binary plugs into. `github`
//! supplies one real implementation so the `deepwiki` binary has something
//! to run against without requiring a separate crate.

pub mod github;

use async_trait::async_trait;

use crate::domain::job::Job;
use crate::error::Result;

pub use github::GithubRepoFetcher;

/// One file discovered in a job's repository, after path-filter exclusion.
#[derive(Debug, Clone)]
pub struct RepoFile {
    pub path: String,
    pub contents: String,
}

/// Supplies repository content to the chunking pipeline and structure
/// generator. Implementations own cloning/checkout, auth, and the
/// `PathFilters` exclusion logic; the core only consumes the result.
#[async_trait]
pub trait RepoFetcher: Send + Sync {
    async fn file_tree(&self, job: &Job) -> Result<Vec<String>>;
    async fn readme(&self, job: &Job) -> Result<Option<String>>;
    async fn fetch_files(&self, job: &Job) -> Result<Vec<RepoFile>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::{PathFilters, RepoType};
    use chrono::Utc;

    struct StubFetcher;

    #[async_trait]
    impl RepoFetcher for StubFetcher {
        async fn file_tree(&self, _job: &Job) -> Result<Vec<String>> {
            Ok(vec!["src/lib.rs".into()])
        }

        async fn readme(&self, _job: &Job) -> Result<Option<String>> {
            Ok(Some("# Example".into()))
        }

        async fn fetch_files(&self, _job: &Job) -> Result<Vec<RepoFile>> {
            Ok(vec![RepoFile { path: "src/lib.rs".into(), contents: "fn main() {}".into() }])
        }
    }

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
            model: None,
            language: "en".into(),
            is_comprehensive: true,
            client_id: None,
            status: crate::domain::job::JobStatus::Pending,
            current_phase: 0,
            progress_percent: 0,
            error_message: None,
            total_pages: 0,
            completed_pages: 0,
            failed_pages: 0,
            total_tokens_used: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            updated_at: Utc::now(),
            wiki_structure: None,
        }
    }

    #[tokio::test]
    async fn stub_fetcher_returns_its_fixed_tree() {
        let fetcher = StubFetcher;
        let job = sample_job();
        assert_eq!(fetcher.file_tree(&job).await.unwrap(), vec!["src/lib.rs"]);
        assert!(fetcher.readme(&job).await.unwrap().is_some());
    }
}
