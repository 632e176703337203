//! deepwiki-core binary: a `serve` subcommand running the API plus the
//! dispatcher loop, and a `migrate` subcommand for schema-only deployments.

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use deepwiki_core::api::ApiServerConfig;
use deepwiki_core::config::AppConfig;
use deepwiki_core::database::{init_pool, run_migrations};
use deepwiki_core::services::ServiceContainer;

#[derive(Parser, Debug)]
#[command(name = "deepwiki", version, about = "Wiki documentation generator core")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run database migrations and exit.
    Migrate,
    /// Run the API server and the job dispatcher (default).
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    deepwiki_core::ensure_crypto_provider();

    let config = AppConfig::from_env();
    let _log_guard = deepwiki_core::logging::init_logging(&config.log_dir)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => run_migrate(&config).await,
        Command::Serve => run_serve(&config).await,
    }
}

async fn run_migrate(config: &AppConfig) -> anyhow::Result<()> {
    info!(database_url = %config.database_url, "running migrations");
    let pool = init_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    info!("migrations complete");
    Ok(())
}

async fn run_serve(config: &AppConfig) -> anyhow::Result<()> {
    info!("starting deepwiki-core v{}", env!("CARGO_PKG_VERSION"));

    let container = ServiceContainer::new(config).await?;
    let dispatcher_handle = container.spawn_dispatcher();

    let api_config = ApiServerConfig::from_env_or_default();
    let api_server = container.build_api_server(api_config);

    info!("deepwiki-core started successfully");

    tokio::select! {
        result = api_server.run() => {
            if let Err(err) = result {
                error!(error = %err, "API server exited with an error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT (Ctrl+C), initiating shutdown...");
        }
        _ = wait_for_sigterm() => {
            info!("received SIGTERM, initiating shutdown...");
        }
    }

    container.shutdown();
    if let Err(err) = dispatcher_handle.await {
        warn!(error = %err, "dispatcher task did not shut down cleanly");
    }

    info!("deepwiki-core shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
