//! Configuration (spec §6 "Environment knobs"): everything read from the
//! environment lives here so the rest of the crate takes plain values
//! instead of reaching for `std::env` ad hoc.

pub mod endpoints;

use std::path::PathBuf;

pub use endpoints::{load_endpoints, EndpointRecord};

const DEFAULT_PAGE_CONCURRENCY: usize = 1;
const DEFAULT_MAX_EMBEDDING_TOKENS: usize = 8000;
const LARGE_MAX_EMBEDDING_TOKENS: usize = 16384;

/// Process-wide settings, read once at startup and threaded through the
/// service container rather than read via scattered `env::var` calls.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_root: PathBuf,
    pub database_url: String,
    pub page_concurrency: usize,
    pub use_syntax_aware_chunking: bool,
    pub max_embedding_tokens: usize,
    pub embedding_device: String,
    pub embedder_cache_dir: PathBuf,
    pub reranker_cache_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppConfig {
    /// Reads every knob from the environment, falling back to the same
    /// defaults the individual modules already assume when run standalone.
    pub fn from_env() -> Self {
        let data_root = env_path("DEEPWIKI_DATA_ROOT", "data");
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite:{}/deepwiki/deepwiki.db?mode=rwc", data_root.display()));

        let max_embedding_tokens = std::env::var("MAX_EMBEDDING_TOKENS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v == DEFAULT_MAX_EMBEDDING_TOKENS || v == LARGE_MAX_EMBEDDING_TOKENS)
            .unwrap_or(DEFAULT_MAX_EMBEDDING_TOKENS);

        Self {
            database_url,
            page_concurrency: env_usize("PAGE_CONCURRENCY", DEFAULT_PAGE_CONCURRENCY),
            use_syntax_aware_chunking: env_bool("USE_SYNTAX_AWARE_CHUNKING", true),
            max_embedding_tokens,
            embedding_device: std::env::var("EMBEDDING_DEVICE").unwrap_or_else(|_| "cpu".to_string()),
            embedder_cache_dir: env_path("EMBEDDER_CACHE_DIR", ".cache/embedder"),
            reranker_cache_dir: env_path("RERANKER_CACHE_DIR", ".cache/reranker"),
            log_dir: env_path("LOG_DIR", "logs"),
            data_root,
        }
    }

    pub fn chunking_config(&self) -> crate::chunking::ChunkingConfig {
        crate::chunking::ChunkingConfig {
            use_syntax_aware_chunking: self.use_syntax_aware_chunking,
            large_embedding_model: self.max_embedding_tokens > DEFAULT_MAX_EMBEDDING_TOKENS,
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).filter(|&v: &usize| v >= 1).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bool_accepts_common_truthy_spellings() {
        unsafe { std::env::set_var("TEST_ENV_BOOL_FLAG", "YES"); }
        assert!(env_bool("TEST_ENV_BOOL_FLAG", false));
        unsafe { std::env::remove_var("TEST_ENV_BOOL_FLAG"); }
        assert!(!env_bool("TEST_ENV_BOOL_FLAG", false));
    }

    #[test]
    fn env_usize_rejects_zero() {
        unsafe { std::env::set_var("TEST_ENV_USIZE_ZERO", "0"); }
        assert_eq!(env_usize("TEST_ENV_USIZE_ZERO", 7), 7);
        unsafe { std::env::remove_var("TEST_ENV_USIZE_ZERO"); }
    }

    #[test]
    fn max_embedding_tokens_falls_back_on_unrecognized_value() {
        unsafe { std::env::set_var("MAX_EMBEDDING_TOKENS", "1234"); }
        let config = AppConfig::from_env();
        assert_eq!(config.max_embedding_tokens, DEFAULT_MAX_EMBEDDING_TOKENS);
        unsafe { std::env::remove_var("MAX_EMBEDDING_TOKENS"); }
    }
}
