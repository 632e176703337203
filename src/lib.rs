//! deepwiki-core library crate: the durable job engine, provider registry,
//! retrieval pipeline, and REST/stream surface for generating wiki
//! documentation from a source repository.

pub mod api;
pub mod chunking;
pub mod config;
pub mod database;
pub mod domain;
pub mod endpoint_pool;
pub mod error;
pub mod logging;
pub mod page_generator;
pub mod progress;
pub mod providers;
pub mod repo_fetcher;
pub mod retrieval;
pub mod services;
pub mod wiki_cache;
pub mod wiki_structure_gen;
pub mod worker;

pub use error::{Error, Result};

static CRYPTO_PROVIDER_INIT: std::sync::Once = std::sync::Once::new();

/// Installs the process-wide default rustls crypto provider. `reqwest` is
/// built with `rustls-tls-webpki-roots-no-provider`, which requires the
/// embedding application to install a provider before any TLS client is
/// constructed; call this before building a `reqwest::Client`.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}
