//! Registry of configured provider clients (spec §4.C) plus the embedder
//! fallback chain (spec §4.E): `builtin → openai → google → openrouter →
//! ollama` by default, exposed via `get_active_embedder()`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::{EmbeddingClient, LlmClient, ProviderKind};
use crate::error::{Error, Result};

/// Default embedder preference order (spec §4.E). Named by config key
/// rather than `ProviderKind` since `openrouter`/`builtin` are OpenAI-wire
/// aliases, not distinct wire shapes.
pub const DEFAULT_EMBEDDER_CHAIN: &[&str] = &["builtin", "openai", "google", "openrouter", "ollama"];

pub struct ProviderRegistry {
    llm_clients: HashMap<String, Arc<dyn LlmClient>>,
    embedding_clients: HashMap<String, Arc<dyn EmbeddingClient>>,
    embedder_chain: Vec<String>,
    active_embedder: RwLock<Option<String>>,
}

impl ProviderRegistry {
    pub fn new(embedder_chain: Vec<String>) -> Self {
        Self {
            llm_clients: HashMap::new(),
            embedding_clients: HashMap::new(),
            embedder_chain,
            active_embedder: RwLock::new(None),
        }
    }

    pub fn with_default_chain() -> Self {
        Self::new(DEFAULT_EMBEDDER_CHAIN.iter().map(|s| s.to_string()).collect())
    }

    pub fn register_llm(&mut self, name: impl Into<String>, client: Arc<dyn LlmClient>) {
        self.llm_clients.insert(name.into(), client);
    }

    pub fn register_embedder(&mut self, name: impl Into<String>, client: Arc<dyn EmbeddingClient>) {
        self.embedding_clients.insert(name.into(), client);
    }

    pub fn llm(&self, name: &str) -> Result<Arc<dyn LlmClient>> {
        self.llm_clients
            .get(name)
            .cloned()
            .ok_or_else(|| Error::config(format!("no LLM client registered for provider '{name}'")))
    }

    /// Selects the first available embedder in the fallback chain, caching
    /// the chosen name until it is explicitly cleared by `mark_unavailable`.
    pub fn get_active_embedder(&self) -> Result<(String, Arc<dyn EmbeddingClient>)> {
        if let Some(name) = self.active_embedder.read().clone() {
            if let Some(client) = self.embedding_clients.get(&name) {
                return Ok((name, client.clone()));
            }
        }

        for name in &self.embedder_chain {
            if let Some(client) = self.embedding_clients.get(name) {
                *self.active_embedder.write() = Some(name.clone());
                info!(embedder = %name, "selected active embedder");
                return Ok((name.clone(), client.clone()));
            }
        }

        Err(Error::config("no embedder in the fallback chain is registered"))
    }

    /// Drops the cached active embedder so the next `get_active_embedder`
    /// call re-walks the chain, skipping the one that just failed.
    pub fn mark_unavailable(&self, name: &str) {
        warn!(embedder = name, "embedder unavailable, falling back");
        let mut guard = self.active_embedder.write();
        if guard.as_deref() == Some(name) {
            *guard = None;
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<ProviderKind> {
        self.llm_clients.get(name).map(|c| c.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;

    struct StubEmbedder(usize);

    #[async_trait]
    impl EmbeddingClient for StubEmbedder {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        fn dimension(&self) -> usize {
            self.0
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
            Ok(texts.iter().map(|_| Some(vec![0.0; self.0])).collect())
        }
    }

    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        fn convert_inputs(
            &self,
            _prompt: &str,
            _model: &str,
            _kwargs: &super::super::ModelKwargs,
            _mode: super::super::CompletionMode,
        ) -> Value {
            Value::Null
        }

        async fn acall(&self, _api_kwargs: Value) -> Result<(super::super::CompletionStream, super::super::UsageHandle)> {
            unimplemented!()
        }
    }

    #[test]
    fn falls_back_to_next_embedder_in_chain_when_preferred_is_unregistered() {
        let mut registry = ProviderRegistry::new(vec!["builtin".into(), "openai".into()]);
        registry.register_embedder("openai", Arc::new(StubEmbedder(1536)));
        let (name, _) = registry.get_active_embedder().unwrap();
        assert_eq!(name, "openai");
    }

    #[test]
    fn mark_unavailable_forces_reselection() {
        let mut registry = ProviderRegistry::new(vec!["builtin".into(), "openai".into()]);
        registry.register_embedder("builtin", Arc::new(StubEmbedder(768)));
        registry.register_embedder("openai", Arc::new(StubEmbedder(1536)));
        let (first, _) = registry.get_active_embedder().unwrap();
        assert_eq!(first, "builtin");
        registry.mark_unavailable("builtin");
        registry.embedding_clients.remove("builtin");
        let (second, _) = registry.get_active_embedder().unwrap();
        assert_eq!(second, "openai");
    }

    #[test]
    fn errors_when_no_llm_registered() {
        let registry = ProviderRegistry::with_default_chain();
        assert!(registry.llm("openai").is_err());
    }

    #[test]
    fn llm_lookup_succeeds_once_registered() {
        let mut registry = ProviderRegistry::with_default_chain();
        registry.register_llm("openai", Arc::new(StubLlm));
        assert!(registry.llm("openai").is_ok());
    }
}
