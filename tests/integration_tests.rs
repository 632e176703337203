//! Integration tests for the deepwiki-core persistence layer.
//!
//! These use a real SQLite database (in-memory) to verify the migrated
//! schema and the job lifecycle transitions work against actual queries,
//! not mocks.

use deepwiki_core::database::repositories::{CreateJobRequest, JobManager, SqliteJobManager};
use deepwiki_core::database::{init_pool, run_migrations, DbPool};
use deepwiki_core::domain::job::{JobStatus, PathFilters, RepoType};

async fn setup_test_db() -> DbPool {
    let pool = init_pool("sqlite::memory:").await.expect("failed to create test pool");
    run_migrations(&pool).await.expect("failed to run migrations");
    pool
}

fn sample_request() -> CreateJobRequest {
    CreateJobRequest {
        repo_url: "https://github.com/acme/widgets".to_string(),
        repo_type: RepoType::Github,
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
        access_token: None,
        filters: PathFilters::default(),
        provider: "openai".to_string(),
        model: None,
        language: "en".to_string(),
        is_comprehensive: false,
        client_id: None,
    }
}

mod database_tests {
    use super::*;

    #[tokio::test]
    async fn migrations_create_every_table_the_repositories_depend_on() {
        let pool = setup_test_db().await;

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .expect("failed to query sqlite_master");

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        for expected in [
            "jobs",
            "job_pages",
            "job_token_stats",
            "user_monthly_budget",
            "chat_usage_logs",
            "rate_limit_tracker",
        ] {
            assert!(table_names.contains(&expected), "{expected} table missing");
        }
    }

    #[tokio::test]
    async fn running_migrations_twice_is_a_no_op() {
        let pool = setup_test_db().await;
        run_migrations(&pool).await.expect("second migration run should be idempotent");
    }
}

mod job_lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn creating_the_same_job_twice_returns_the_existing_id() {
        let pool = setup_test_db().await;
        let jobs = SqliteJobManager::new(pool);

        let first_id = jobs.create_job(sample_request()).await.unwrap();
        let second_id = jobs.create_job(sample_request()).await.unwrap();

        assert_eq!(first_id, second_id, "duplicate (owner, repo, provider, language) should reuse the active job");
    }

    #[tokio::test]
    async fn a_pending_job_cannot_be_paused() {
        let pool = setup_test_db().await;
        let jobs = SqliteJobManager::new(pool);

        let job_id = jobs.create_job(sample_request()).await.unwrap();
        let paused = jobs.pause_job(&job_id).await.unwrap();

        assert!(!paused, "pause should be a no-op test-and-set when the job isn't actively generating pages");
    }

    #[tokio::test]
    async fn cancelling_a_pending_job_moves_it_to_a_terminal_state() {
        let pool = setup_test_db().await;
        let jobs = SqliteJobManager::new(pool);

        let job_id = jobs.create_job(sample_request()).await.unwrap();
        assert!(jobs.cancel_job(&job_id).await.unwrap());

        let job = jobs.get_job(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.status.is_terminal());
    }

    #[tokio::test]
    async fn retrying_a_job_not_in_a_terminal_state_fails() {
        let pool = setup_test_db().await;
        let jobs = SqliteJobManager::new(pool);

        let job_id = jobs.create_job(sample_request()).await.unwrap();
        let retried = jobs.retry_job(&job_id).await.unwrap();

        assert!(!retried, "a pending job has nothing to retry");
    }
}
