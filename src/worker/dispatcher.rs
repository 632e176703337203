//! The single long-running dispatcher task (spec §4.I): polls for pending
//! jobs and drives each through phase 0 (embeddings), phase 1 (structure),
//! and phase 2 (pages), re-reading job status at every phase boundary so a
//! pause or cancellation issued mid-run is honored promptly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunking::{self, ChunkingConfig};
use crate::database::repositories::{JobManager, NewPage, TokenRepository};
use crate::domain::job::{Job, JobStatus};
use crate::domain::page::{Page, PageStatus};
use crate::domain::wiki_structure::WikiStructure;
use crate::error::Result;
use crate::page_generator;
use crate::progress::{ProgressBus, ProgressEvent, TokenSummary};
use crate::providers::{complete_to_string, CompletionMode, ModelKwargs, ProviderRegistry};
use crate::repo_fetcher::RepoFetcher;
use crate::retrieval::Index;
use crate::wiki_cache;
use crate::wiki_structure_gen;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const RETRIEVAL_TOP_K: usize = 10;

/// Evaluates the "should-stop" predicate of spec §4.I: a shutdown signal,
/// or the job's persisted status having moved to `paused`/`cancelled`.
pub struct ShouldStop {
    shutdown: CancellationToken,
}

impl ShouldStop {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn job_stopped(status: JobStatus) -> bool {
        matches!(status, JobStatus::Paused | JobStatus::Cancelled)
    }
}

pub struct Dispatcher {
    jobs: Arc<dyn JobManager>,
    tokens: Arc<dyn TokenRepository>,
    bus: Arc<ProgressBus>,
    fetcher: Arc<dyn RepoFetcher>,
    registry: Arc<ProviderRegistry>,
    data_root: PathBuf,
    page_concurrency: usize,
    chunking_config: ChunkingConfig,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        jobs: Arc<dyn JobManager>,
        tokens: Arc<dyn TokenRepository>,
        bus: Arc<ProgressBus>,
        fetcher: Arc<dyn RepoFetcher>,
        registry: Arc<ProviderRegistry>,
        data_root: PathBuf,
        shutdown: CancellationToken,
    ) -> Self {
        let env_config = crate::config::AppConfig::from_env();
        let page_concurrency = env_config.page_concurrency;
        let chunking_config = env_config.chunking_config();
        Self {
            jobs,
            tokens,
            bus,
            fetcher,
            registry,
            data_root,
            page_concurrency,
            chunking_config,
            shutdown,
        }
    }

    /// The poll loop (spec §4.I steps 1-2). Never returns under normal
    /// operation; exits when the shutdown token fires.
    pub async fn run(&self) {
        loop {
            if self.shutdown.is_cancelled() {
                info!("dispatcher shutting down");
                return;
            }

            let pending = match self.jobs.get_pending_jobs().await {
                Ok(jobs) => jobs,
                Err(err) => {
                    error!(error = %err, "failed to poll pending jobs");
                    sleep(POLL_INTERVAL).await;
                    continue;
                }
            };

            let Some(job) = pending.into_iter().next() else {
                sleep(POLL_INTERVAL).await;
                continue;
            };

            if let Err(err) = self.process_job(job).await {
                error!(error = %err, "job processing ended in error");
            }
        }
    }

    /// Drives one job through phases 0-2 (spec §4.I steps 3-6). Re-reads
    /// status before each phase to protect against a lost cancellation
    /// between the polling query and this call.
    async fn process_job(&self, job: Job) -> Result<()> {
        let should_stop = ShouldStop::new(self.shutdown.clone());

        let job = self.jobs.get_job(&job.id).await?;
        if job.status.is_terminal() || job.status == JobStatus::Paused {
            debug!(job_id = %job.id, status = %job.status, "skipping job, no longer active");
            return Ok(());
        }

        if should_stop.shutdown_requested() {
            return Ok(());
        }

        let model = job.model.clone().unwrap_or_default();
        let llm = self.registry.llm(&job.provider)?;

        let index = if job.status == JobStatus::Pending || job.status == JobStatus::PreparingEmbeddings {
            self.jobs
                .update_job_status(&job.id, JobStatus::PreparingEmbeddings, Some(0), Some(0), None)
                .await?;
            self.emit(&job, "phase 0: preparing embeddings", None, None, None).await;
            self.run_phase_embeddings(&job).await?
        } else {
            Index::new(Vec::new())
        };
        let index = Arc::new(index);

        let job = self.jobs.get_job(&job.id).await?;
        if ShouldStop::job_stopped(job.status) {
            return Ok(());
        }

        if job.status == JobStatus::PreparingEmbeddings || job.wiki_structure.is_none() {
            self.jobs
                .update_job_status(&job.id, JobStatus::GeneratingStructure, Some(1), Some(33), None)
                .await?;
            self.emit(&job, "phase 1: generating wiki structure", None, None, None).await;
            self.run_phase_structure(&job, llm.as_ref(), &model).await?;
        }

        let job = self.jobs.get_job(&job.id).await?;
        if ShouldStop::job_stopped(job.status) {
            return Ok(());
        }

        self.jobs
            .update_job_status(&job.id, JobStatus::GeneratingPages, Some(2), Some(66), None)
            .await?;
        self.emit(&job, "phase 2: generating pages", None, None, None).await;

        // Crash recovery: anything left `in_progress` from a prior run is requeued.
        self.jobs.reset_stuck_pages(&job.id).await?;

        self.run_phase_pages(&job, llm.clone(), &model, index.clone(), &should_stop).await?;

        let job = self.jobs.get_job(&job.id).await?;
        if ShouldStop::job_stopped(job.status) {
            return Ok(());
        }

        let final_status = if job.failed_pages > 0 { JobStatus::PartiallyCompleted } else { JobStatus::Completed };
        self.jobs.update_job_status(&job.id, final_status, Some(2), Some(100), None).await?;
        let job = self.jobs.get_job(&job.id).await?;
        self.emit(&job, "job finished", None, None, None).await;

        if let Some(structure_json) = &job.wiki_structure {
            if let Ok(structure) = serde_json::from_str::<WikiStructure>(structure_json) {
                let detail = self.jobs.get_job_detail(&job.id).await?;
                if let Err(err) = wiki_cache::persist(&self.data_root, &job, &structure, &detail.pages).await {
                    warn!(job_id = %job.id, error = %err, "failed to persist wiki cache artifact");
                }
            }
        }

        Ok(())
    }

    async fn run_phase_embeddings(&self, job: &Job) -> Result<Index> {
        self.tokens.initialize_job_tokens(&job.id).await.ok();

        let files = self.fetcher.fetch_files(job).await?;

        let mut chunks = Vec::new();
        for file in &files {
            chunks.extend(chunking::chunk_file(&file.path, &file.contents, &self.chunking_config));
        }

        let total_tokens: u64 = chunks.iter().map(|c| u64::from(c.token_count)).sum();
        self.tokens.update_chunking_tokens(&job.id, total_tokens, chunks.len() as u64).await?;

        let (_name, embedder) = self.registry.get_active_embedder()?;
        let embedded = chunking::embed::embed_chunks(chunks, embedder.as_ref(), 32).await?;

        Ok(Index::new(embedded))
    }

    async fn run_phase_structure(&self, job: &Job, llm: &dyn crate::providers::LlmClient, model: &str) -> Result<()> {
        let file_tree = self.fetcher.file_tree(job).await?;
        let readme = self.fetcher.readme(job).await?;

        let base_prompt = wiki_structure_gen::build_prompt(
            &job.owner,
            &job.repo,
            &file_tree,
            readme.as_deref(),
            &job.language,
            job.is_comprehensive,
        );

        let model_owned = model.to_string();
        let structure = wiki_structure_gen::generate_structure(&base_prompt, |prompt| {
            let model = model_owned.clone();
            async move {
                let (text, usage) = complete_to_string(llm, &prompt, &model, &ModelKwargs::default(), CompletionMode::Llm).await?;
                self.tokens.update_provider_tokens(&job.id, usage.prompt_tokens, usage.completion_tokens).await.ok();
                Ok(text)
            }
        })
        .await?;

        let new_pages: Vec<NewPage> = structure
            .pages
            .iter()
            .map(|p| NewPage {
                page_id: p.id.clone(),
                title: p.title.clone(),
                description: p.description.clone(),
                importance: p.importance,
                file_paths: p.relevant_files.clone(),
                related_pages: p.related_pages.clone(),
                parent_section: p.parent_section.clone(),
            })
            .collect();

        let structure_json = serde_json::to_string(&structure)?;
        self.jobs.set_wiki_structure(&job.id, &structure_json, new_pages).await?;
        Ok(())
    }

    /// Drains the job's pending pages, running up to `page_concurrency` of
    /// them at once: each acquired permit is handed to its own spawned
    /// task so a slow page doesn't block the next one from starting.
    async fn run_phase_pages(
        &self,
        job: &Job,
        llm: Arc<dyn crate::providers::LlmClient>,
        model: &str,
        index: Arc<Index>,
        should_stop: &ShouldStop,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.page_concurrency));
        let mut tasks = JoinSet::new();

        loop {
            if should_stop.shutdown_requested() {
                break;
            }
            let job_now = self.jobs.get_job(&job.id).await?;
            if ShouldStop::job_stopped(job_now.status) {
                break;
            }

            let Some(page) = self.jobs.get_next_pending_page(&job.id).await? else {
                break;
            };

            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
            let jobs = self.jobs.clone();
            let tokens = self.tokens.clone();
            let bus = self.bus.clone();
            let registry = self.registry.clone();
            let job_for_task = job.clone();
            let llm = llm.clone();
            let model = model.to_string();
            let index = index.clone();

            tasks.spawn(async move {
                let _permit = permit;
                run_one_page(jobs, tokens, bus, registry, &job_for_task, llm.as_ref(), &model, index.as_ref(), &page).await;
            });
        }

        // The phase isn't over until every page spawned above has finished,
        // not merely been scheduled.
        while tasks.join_next().await.is_some() {}

        Ok(())
    }

    async fn emit(&self, job: &Job, message: &str, page_id: Option<&str>, page_title: Option<&str>, page_status: Option<&str>) {
        emit_progress(&self.bus, self.tokens.as_ref(), job, message, page_id, page_title, page_status).await;
    }
}

/// Runs one page to completion: generation, retry-on-malformed-output (via
/// `page_generator::generate_page`), and the terminal status write. Spawned
/// as its own task per page, so it takes owned handles rather than `&self`.
#[allow(clippy::too_many_arguments)]
async fn run_one_page(
    jobs: Arc<dyn JobManager>,
    tokens: Arc<dyn TokenRepository>,
    bus: Arc<ProgressBus>,
    registry: Arc<ProviderRegistry>,
    job: &Job,
    llm: &dyn crate::providers::LlmClient,
    model: &str,
    index: &Index,
    page: &Page,
) {
    let start = std::time::Instant::now();
    if let Err(err) = jobs.update_page_status(&page.id, PageStatus::InProgress, None, None, None, None).await {
        warn!(page_id = %page.page_id, error = %err, "failed to mark page in_progress");
        return;
    }
    emit_progress(&bus, tokens.as_ref(), job, "generating page", Some(&page.page_id), Some(&page.title), Some("in_progress")).await;

    let query_text = page.file_paths.first().cloned().unwrap_or_else(|| page.title.clone());
    let query_vector = embed_query(registry.as_ref(), &query_text).await;
    let context = query_vector.map(|v| index.search_default(&v)).unwrap_or_default();
    let prompt = page_generator::build_page_prompt(
        &crate::domain::wiki_structure::PageMeta {
            id: page.page_id.clone(),
            title: page.title.clone(),
            description: page.description.clone(),
            importance: page.importance,
            relevant_files: page.file_paths.clone(),
            related_pages: page.related_pages.clone(),
            parent_section: page.parent_section.clone(),
        },
        &job.language,
        &context[..context.len().min(RETRIEVAL_TOP_K)],
    );

    let model_owned = model.to_string();
    let result = page_generator::generate_page(
        &prompt,
        |p| {
            let model = model_owned.clone();
            let tokens = tokens.clone();
            let job_id = job.id.clone();
            async move {
                let (text, usage) = complete_to_string(llm, &p, &model, &ModelKwargs::default(), CompletionMode::Llm).await?;
                tokens.update_provider_tokens(&job_id, usage.prompt_tokens, usage.completion_tokens).await.ok();
                Ok(text)
            }
        },
        |fix_prompt| {
            let model = model_owned.clone();
            async move {
                let (text, _usage) = complete_to_string(llm, &fix_prompt, &model, &ModelKwargs::default(), CompletionMode::Llm).await?;
                Ok(text)
            }
        },
    )
    .await;

    let elapsed_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(generated) => {
            let tokens_used = generated.prompt_tokens + generated.response_tokens;
            if let Err(err) = jobs
                .update_page_status(
                    &page.id,
                    PageStatus::Completed,
                    Some(&generated.content),
                    Some(tokens_used),
                    Some(elapsed_ms),
                    None,
                )
                .await
            {
                warn!(page_id = %page.page_id, error = %err, "failed to persist completed page");
                return;
            }
            jobs.increment_job_page_count(&job.id, 1, 0, tokens_used).await.ok();
            emit_progress(&bus, tokens.as_ref(), job, "page completed", Some(&page.page_id), Some(&page.title), Some("completed")).await;
        }
        Err(err) => {
            let next_status = Page::status_after_failure(page.retry_count + 1);
            jobs.update_page_status(&page.id, next_status, None, None, Some(elapsed_ms), Some(&err.to_string())).await.ok();
            if next_status == PageStatus::PermanentFailed {
                jobs.increment_job_page_count(&job.id, 0, 1, 0).await.ok();
            }
            warn!(page_id = %page.page_id, error = %err, "page generation failed");
            emit_progress(
                &bus,
                tokens.as_ref(),
                job,
                "page failed",
                Some(&page.page_id),
                Some(&page.title),
                Some(next_status.to_string().as_str()),
            )
            .await;
        }
    }
}

/// Embeds a retrieval query through the same active embedder selected in
/// phase 0. Returns `None` rather than erroring the page if no embedder is
/// available or the embedding comes back empty; the page still generates,
/// just without retrieved context.
async fn embed_query(registry: &ProviderRegistry, text: &str) -> Option<Vec<f32>> {
    let (_name, embedder) = registry.get_active_embedder().ok()?;
    let result = embedder.embed(&[text.to_string()]).await.ok()?;
    result.into_iter().next().flatten()
}

async fn emit_progress(
    bus: &ProgressBus,
    tokens: &dyn TokenRepository,
    job: &Job,
    message: &str,
    page_id: Option<&str>,
    page_title: Option<&str>,
    page_status: Option<&str>,
) {
    let token_summary = tokens.get_job_tokens(&job.id).await.ok().map(|stats| TokenSummary {
        chunking_total_tokens: stats.chunking_total_tokens,
        provider_prompt_tokens: stats.provider_prompt_tokens,
        provider_completion_tokens: stats.provider_completion_tokens,
    });
    bus.emit(ProgressEvent {
        job_id: job.id.clone(),
        status: job.status.to_string(),
        phase: job.current_phase,
        progress_percent: job.progress_percent,
        message: message.to_string(),
        page_id: page_id.map(str::to_string),
        page_title: page_title.map(str::to_string),
        page_status: page_status.map(str::to_string),
        total_pages: job.total_pages,
        completed_pages: job.completed_pages,
        failed_pages: job.failed_pages,
        error: job.error_message.clone(),
        token_summary,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::database::repositories::{CreateJobRequest, SqliteJobManager, SqliteTokenRepository};
    use crate::database::{init_pool, run_migrations};
    use crate::domain::job::{PathFilters, RepoType};
    use crate::providers::{CompletionStream, EmbeddingClient, LlmClient, UsageHandle};
    use crate::repo_fetcher::RepoFile;

    const STRUCTURE_XML: &str = r#"<wiki_structure>
        <title>Example</title>
        <description>An example repo</description>
        <pages>
            <page id="p1">
                <title>Overview</title>
                <description>High level summary</description>
                <importance>high</importance>
                <relevant_files><file>src/lib.rs</file></relevant_files>
                <related_pages></related_pages>
            </page>
        </pages>
        <sections></sections>
    </wiki_structure>"#;

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

    /// First call returns the wiki structure XML; every later call returns
    /// a plain page body with no Mermaid fences, so no fix round-trip fires.
    struct ScriptedLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        fn kind(&self) -> crate::providers::ProviderKind {
            crate::providers::ProviderKind::OpenAi
        }

        fn convert_inputs(
            &self,
            _prompt: &str,
            _model: &str,
            _kwargs: &ModelKwargs,
            _mode: CompletionMode,
        ) -> Value {
            Value::Null
        }

        async fn acall(&self, _api_kwargs: Value) -> Result<(CompletionStream, UsageHandle)> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let text = if n == 0 { STRUCTURE_XML.to_string() } else { "# Overview\n\nSome content.".to_string() };
            let usage = crate::providers::new_usage_handle();
            usage.lock().prompt_tokens = 10;
            usage.lock().completion_tokens = 5;
            let stream = futures::stream::iter(vec![Ok(text)]);
            Ok((Box::pin(stream), usage))
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingClient for StubEmbedder {
        fn kind(&self) -> crate::providers::ProviderKind {
            crate::providers::ProviderKind::OpenAi
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
            Ok(texts.iter().map(|_| Some(vec![0.1, 0.2])).collect())
        }
    }

    async fn setup_dispatcher() -> (Dispatcher, Arc<SqliteJobManager>, String) {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let jobs = Arc::new(SqliteJobManager::new(pool.clone()));
        let tokens = Arc::new(SqliteTokenRepository::new(pool));

        let job_id = jobs
            .create_job(CreateJobRequest {
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
            })
            .await
            .unwrap();

        let mut registry = ProviderRegistry::new(vec!["builtin".into()]);
        registry.register_llm("openai", Arc::new(ScriptedLlm { calls: AtomicUsize::new(0) }));
        registry.register_embedder("builtin", Arc::new(StubEmbedder));

        let dispatcher = Dispatcher::new(
            jobs.clone(),
            tokens,
            Arc::new(ProgressBus::new()),
            Arc::new(StubFetcher),
            Arc::new(registry),
            std::env::temp_dir().join(format!("deepwiki-dispatcher-test-{job_id}")),
            CancellationToken::new(),
        );

        (dispatcher, jobs, job_id)
    }

    #[tokio::test]
    async fn drives_a_pending_job_through_to_completion() {
        let (dispatcher, jobs, job_id) = setup_dispatcher().await;
        let job = jobs.get_job(&job_id).await.unwrap();

        dispatcher.process_job(job).await.unwrap();

        let finished = jobs.get_job(&job_id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.completed_pages, 1);
        assert_eq!(finished.failed_pages, 0);
        assert!(finished.wiki_structure.is_some());
    }

    #[tokio::test]
    async fn skips_a_job_already_paused() {
        let (dispatcher, jobs, job_id) = setup_dispatcher().await;
        // Pause only applies once a job has actually started; a job fresh
        // off creation is still `pending`, not a pausable phase.
        jobs.update_job_status(&job_id, JobStatus::GeneratingPages, Some(2), Some(50), None).await.unwrap();
        assert!(jobs.pause_job(&job_id).await.unwrap());
        let job = jobs.get_job(&job_id).await.unwrap();

        dispatcher.process_job(job).await.unwrap();

        let still_paused = jobs.get_job(&job_id).await.unwrap();
        assert_eq!(still_paused.status, JobStatus::Paused);
    }
}
