//! Logging setup: `tracing` + `tracing-subscriber` with a console layer and
//! a daily-rotating file sink. No database-persisted filter reload or
//! websocket broadcast here; there is no config-service or log-streaming
//! API in this crate to drive those.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Error, Result};

const DEFAULT_LOG_FILTER: &str = "deepwiki_core=info,sqlx=warn,tower_http=info";

/// Initializes the global tracing subscriber. Returns the `WorkerGuard` for
/// the non-blocking file writer; it must be kept alive for the process
/// lifetime or buffered log lines are dropped on exit.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| Error::config(format!("failed to create log directory {}: {e}", log_dir.display())))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "deepwiki-core.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .map_err(|e| Error::config(format!("failed to install global subscriber: {e}")))?;

    Ok(guard)
}

/// Default log directory used when `LOG_DIR` is unset.
pub fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
