//! Wires the Endpoint Failover Pool (spec §4.D) into the `LlmClient`/
//! `EmbeddingClient` trait family: each call re-resolves a fresh
//! provider-specific client for whichever endpoint the pool currently
//! favors, rather than holding one fixed `base_url`/`credential` pair.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{CompletionMode, CompletionStream, EmbeddingClient, LlmClient, ModelKwargs, ProviderKind, UsageHandle};
use crate::domain::Endpoint;
use crate::endpoint_pool::EndpointPool;
use crate::error::Result;

/// Builds a concrete `LlmClient` bound to one endpoint's `base_url`/
/// `credential`. Cheap: provider clients are thin `reqwest::Client` +
/// string wrappers.
pub type LlmClientFactory = Arc<dyn Fn(&Endpoint) -> Arc<dyn LlmClient> + Send + Sync>;
pub type EmbeddingClientFactory = Arc<dyn Fn(&Endpoint) -> Arc<dyn EmbeddingClient> + Send + Sync>;

pub struct FailoverLlmClient {
    kind: ProviderKind,
    pool: Arc<EndpointPool>,
    factory: LlmClientFactory,
    template: Arc<dyn LlmClient>,
}

impl FailoverLlmClient {
    /// `template` is only used for `convert_inputs`, which is endpoint-
    /// independent (it just shapes the request body); `factory` builds the
    /// client actually used to issue each call.
    pub fn new(kind: ProviderKind, pool: Arc<EndpointPool>, factory: LlmClientFactory, template: Arc<dyn LlmClient>) -> Self {
        Self { kind, pool, factory, template }
    }
}

#[async_trait]
impl LlmClient for FailoverLlmClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn convert_inputs(&self, prompt: &str, model: &str, kwargs: &ModelKwargs, mode: CompletionMode) -> Value {
        self.template.convert_inputs(prompt, model, kwargs, mode)
    }

    async fn acall(&self, api_kwargs: Value) -> Result<(CompletionStream, UsageHandle)> {
        let factory = self.factory.clone();
        self.pool
            .call_with_failover(|endpoint| {
                let client = factory(&endpoint);
                let api_kwargs = api_kwargs.clone();
                async move { client.acall(api_kwargs).await }
            })
            .await
    }
}

pub struct FailoverEmbeddingClient {
    kind: ProviderKind,
    dimension: usize,
    pool: Arc<EndpointPool>,
    factory: EmbeddingClientFactory,
}

impl FailoverEmbeddingClient {
    pub fn new(kind: ProviderKind, dimension: usize, pool: Arc<EndpointPool>, factory: EmbeddingClientFactory) -> Self {
        Self { kind, dimension, pool, factory }
    }
}

#[async_trait]
impl EmbeddingClient for FailoverEmbeddingClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let factory = self.factory.clone();
        self.pool
            .call_with_failover(|endpoint| {
                let client = factory(&endpoint);
                let texts = texts.to_vec();
                async move { client.embed(&texts).await }
            })
            .await
    }
}
