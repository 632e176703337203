//! Service container: wires the persistence layer, the provider registry,
//! the dispatcher, and the API server into one owned graph, the way the
//! teacher's `services::container::ServiceContainer` wires its download
//! manager, pipeline manager, and API server off one pool.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{ApiServer, ApiServerConfig, AppState};
use crate::config::AppConfig;
use crate::database::repositories::{
    SqliteBudgetRepository, SqliteJobManager, SqliteRateLimitRepository, SqliteTokenRepository,
};
use crate::database::{init_pool, run_migrations, DbPool};
use crate::endpoint_pool::EndpointPool;
use crate::error::{Error, Result};
use crate::progress::ProgressBus;
use crate::providers::failover::{FailoverEmbeddingClient, FailoverLlmClient};
use crate::providers::{anthropic, google, ollama, openai, ProviderKind, ProviderRegistry};
use crate::repo_fetcher::GithubRepoFetcher;
use crate::worker::dispatcher::Dispatcher;

/// All long-lived services, owned for the process lifetime. `AppState`
/// (what the API layer sees) borrows the same `Arc`s rather than a second
/// copy of the graph.
pub struct ServiceContainer {
    pub pool: DbPool,
    pub jobs: Arc<SqliteJobManager>,
    pub tokens: Arc<SqliteTokenRepository>,
    pub budgets: Arc<SqliteBudgetRepository>,
    pub rate_limits: Arc<SqliteRateLimitRepository>,
    pub bus: Arc<ProgressBus>,
    pub registry: Arc<ProviderRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    cancel_token: CancellationToken,
    data_root: PathBuf,
}

impl ServiceContainer {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let pool = init_pool(&config.database_url).await?;
        run_migrations(&pool).await.map_err(|e| Error::Database(e.to_string()))?;

        let jobs = Arc::new(SqliteJobManager::new(pool.clone()));
        let tokens = Arc::new(SqliteTokenRepository::new(pool.clone()));
        let budgets = Arc::new(SqliteBudgetRepository::new(pool.clone()));
        let rate_limits = Arc::new(SqliteRateLimitRepository::new(pool.clone()));
        let bus = Arc::new(ProgressBus::new());

        let registry = Arc::new(build_provider_registry());

        let cancel_token = CancellationToken::new();
        let dispatcher = Arc::new(Dispatcher::new(
            jobs.clone(),
            tokens.clone(),
            bus.clone(),
            Arc::new(GithubRepoFetcher::new()),
            registry.clone(),
            config.data_root.clone(),
            cancel_token.clone(),
        ));

        Ok(Self {
            pool,
            jobs,
            tokens,
            budgets,
            rate_limits,
            bus,
            registry,
            dispatcher,
            cancel_token,
            data_root: config.data_root.clone(),
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Spawns the dispatcher's poll loop as a background task. Returns the
    /// `JoinHandle` so the caller can await it during shutdown.
    pub fn spawn_dispatcher(&self) -> tokio::task::JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move { dispatcher.run().await })
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.jobs.clone(), self.tokens.clone(), self.bus.clone())
    }

    pub fn build_api_server(&self, api_config: ApiServerConfig) -> ApiServer {
        ApiServer::new(api_config, self.app_state(), self.cancel_token.clone())
    }

    pub fn data_root(&self) -> &PathBuf {
        &self.data_root
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

/// Registers every concrete `LlmClient`/`EmbeddingClient` whose API key is
/// present in the environment, each wrapped in a `FailoverLlmClient` over
/// whatever endpoints `config::load_endpoints` resolves for it. Providers
/// with no configured credentials are simply absent from the registry; the
/// dispatcher surfaces that as `Error::config` ("no LLM client registered")
/// the first time a job asks for them.
fn build_provider_registry() -> ProviderRegistry {
    crate::ensure_crypto_provider();
    let mut registry = ProviderRegistry::with_default_chain();
    let http = reqwest::Client::new();

    register_openai(&mut registry, &http);
    register_anthropic(&mut registry, &http);
    register_google(&mut registry, &http);
    register_ollama(&mut registry, &http);

    registry
}

fn register_openai(registry: &mut ProviderRegistry, http: &reqwest::Client) {
    let endpoints = crate::config::load_endpoints("OPENAI", "https://api.openai.com/v1", "OPENAI_API_KEY");
    if endpoints.is_empty() {
        return;
    }
    let pool = Arc::new(EndpointPool::new(endpoints));

    let http_llm = http.clone();
    let llm_factory = Arc::new(move |ep: &crate::domain::Endpoint| -> Arc<dyn crate::providers::LlmClient> {
        Arc::new(openai::OpenAiClient::new(http_llm.clone(), ep.base_url.clone(), ep.credential.clone()))
    });
    let template: Arc<dyn crate::providers::LlmClient> =
        Arc::new(openai::OpenAiClient::new(http.clone(), "https://api.openai.com/v1", ""));
    registry.register_llm("openai", Arc::new(FailoverLlmClient::new(ProviderKind::OpenAi, pool.clone(), llm_factory, template)));

    let http_embed = http.clone();
    let embed_model = std::env::var("OPENAI_EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-3-small".to_string());
    let embed_factory = Arc::new(move |ep: &crate::domain::Endpoint| -> Arc<dyn crate::providers::EmbeddingClient> {
        Arc::new(openai::OpenAiEmbeddingClient::new(
            http_embed.clone(),
            ep.base_url.clone(),
            ep.credential.clone(),
            embed_model.clone(),
            1536,
        ))
    });
    registry.register_embedder("openai", Arc::new(FailoverEmbeddingClient::new(ProviderKind::OpenAi, 1536, pool, embed_factory)));
}

fn register_anthropic(registry: &mut ProviderRegistry, http: &reqwest::Client) {
    let endpoints = crate::config::load_endpoints("ANTHROPIC", "https://api.anthropic.com", "ANTHROPIC_API_KEY");
    if endpoints.is_empty() {
        return;
    }
    let pool = Arc::new(EndpointPool::new(endpoints));

    let http_llm = http.clone();
    let llm_factory = Arc::new(move |ep: &crate::domain::Endpoint| -> Arc<dyn crate::providers::LlmClient> {
        Arc::new(anthropic::AnthropicClient::new(http_llm.clone(), ep.base_url.clone(), ep.credential.clone()))
    });
    let template: Arc<dyn crate::providers::LlmClient> =
        Arc::new(anthropic::AnthropicClient::new(http.clone(), "https://api.anthropic.com", ""));
    registry.register_llm("anthropic", Arc::new(FailoverLlmClient::new(ProviderKind::Anthropic, pool, llm_factory, template)));
}

fn register_google(registry: &mut ProviderRegistry, http: &reqwest::Client) {
    let endpoints = crate::config::load_endpoints(
        "GOOGLE",
        "https://generativelanguage.googleapis.com",
        "GOOGLE_API_KEY",
    );
    if endpoints.is_empty() {
        return;
    }
    let pool = Arc::new(EndpointPool::new(endpoints));

    let http_llm = http.clone();
    let llm_factory = Arc::new(move |ep: &crate::domain::Endpoint| -> Arc<dyn crate::providers::LlmClient> {
        Arc::new(google::GoogleClient::new(http_llm.clone(), ep.base_url.clone(), ep.credential.clone()))
    });
    let template: Arc<dyn crate::providers::LlmClient> = Arc::new(google::GoogleClient::new(
        http.clone(),
        "https://generativelanguage.googleapis.com",
        "",
    ));
    registry.register_llm("google", Arc::new(FailoverLlmClient::new(ProviderKind::Google, pool.clone(), llm_factory, template)));

    let http_embed = http.clone();
    let embed_model = std::env::var("GOOGLE_EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-004".to_string());
    let embed_factory = Arc::new(move |ep: &crate::domain::Endpoint| -> Arc<dyn crate::providers::EmbeddingClient> {
        Arc::new(google::GoogleEmbeddingClient::new(
            http_embed.clone(),
            ep.base_url.clone(),
            ep.credential.clone(),
            embed_model.clone(),
            768,
        ))
    });
    registry.register_embedder("google", Arc::new(FailoverEmbeddingClient::new(ProviderKind::Google, 768, pool, embed_factory)));
}

fn register_ollama(registry: &mut ProviderRegistry, http: &reqwest::Client) {
    let Ok(base_url) = std::env::var("OLLAMA_BASE_URL") else { return };
    let pool = Arc::new(EndpointPool::new(vec![crate::domain::Endpoint::new("ollama-default", &base_url, "")]));

    let http_llm = http.clone();
    let llm_factory = Arc::new(move |ep: &crate::domain::Endpoint| -> Arc<dyn crate::providers::LlmClient> {
        Arc::new(ollama::OllamaClient::new(http_llm.clone(), ep.base_url.clone()))
    });
    let template: Arc<dyn crate::providers::LlmClient> = Arc::new(ollama::OllamaClient::new(http.clone(), base_url.clone()));
    registry.register_llm("ollama", Arc::new(FailoverLlmClient::new(ProviderKind::Ollama, pool.clone(), llm_factory, template)));

    let http_embed = http.clone();
    let embed_model = std::env::var("OLLAMA_EMBEDDING_MODEL").unwrap_or_else(|_| "nomic-embed-text".to_string());
    let embed_factory = Arc::new(move |ep: &crate::domain::Endpoint| -> Arc<dyn crate::providers::EmbeddingClient> {
        Arc::new(ollama::OllamaEmbeddingClient::new(http_embed.clone(), ep.base_url.clone(), embed_model.clone(), 768))
    });
    registry.register_embedder("ollama", Arc::new(FailoverEmbeddingClient::new(ProviderKind::Ollama, 768, pool, embed_factory)));
}
