//! Provider Registry: abstracts over heterogeneous LLM and embedding
//! backends behind two small trait families, so callers select a provider
//! by name without knowing its wire protocol.

pub mod anthropic;
pub mod backoff;
pub mod failover;
pub mod google;
pub mod ollama;
pub mod openai;
pub mod quirks;
pub mod registry;
pub mod sse;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use quirks::ProviderQuirks;
pub use registry::ProviderRegistry;

/// The wire-shape family a concrete provider aligns to (spec §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
    Ollama,
}

impl ProviderKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Ollama => "ollama",
        }
    }
}

/// Whether a prompt is being sent for structure generation or page content —
/// some quirks (e.g. `system_prompt_split`) read this to decide shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    Llm,
}

/// Model sampling parameters as supplied by the caller, before quirks are
/// applied. Optional fields are omitted from the wire payload when `None`.
#[derive(Debug, Clone, Default)]
pub struct ModelKwargs {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

/// A single text delta from a completion stream. Heartbeat and role-only
/// frames never reach the caller as deltas (spec §4.C streaming
/// normalization) — it yields `Err` only on malformed frames.
pub type TextDelta = String;
pub type CompletionStream = BoxStream<'static, Result<TextDelta>>;

/// Token usage reported once a completion stream finishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Completion capability (spec §4.C). `convert_inputs` applies provider
/// quirks and returns the wire-ready request body; `acall` issues the HTTP
/// call and normalizes the response into a stream of text deltas.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn convert_inputs(&self, prompt: &str, model: &str, kwargs: &ModelKwargs, mode: CompletionMode) -> Value;

    async fn acall(&self, api_kwargs: Value) -> Result<(CompletionStream, UsageHandle)>;
}

/// Embedding capability (spec §4.C). A `None` entry marks an input whose
/// embedding the provider returned empty for; callers must drop these
/// rather than index a zero vector.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>>;

    /// Embedding dimension this client produces, used to validate chunks
    /// before they enter the retrieval index.
    fn dimension(&self) -> usize;
}

/// Handle populated with token usage once a stream completes; `acall`
/// returns it alongside the stream since usage typically arrives in a
/// trailing frame, after the caller has already consumed deltas.
pub type UsageHandle = std::sync::Arc<parking_lot::Mutex<Usage>>;

pub fn new_usage_handle() -> UsageHandle {
    std::sync::Arc::new(parking_lot::Mutex::new(Usage::default()))
}

/// Classifies a model name as a "reasoning" model per the
/// `strip_sampling_for_reasoning_models` quirk (spec §4.C table).
pub fn is_reasoning_model(model: &str) -> bool {
    let lower = model.to_ascii_lowercase();
    lower.starts_with("o1") || lower.starts_with("o3") || lower.starts_with("o4") || lower.contains("reasoning")
}

/// Markers for the system/user prompt split tag pair (spec §4.C,
/// `system_prompt_split` quirk).
pub const SYSTEM_PROMPT_START: &str = "<START_OF_SYSTEM_PROMPT>";
pub const SYSTEM_PROMPT_END: &str = "<END_OF_SYSTEM_PROMPT>";
pub const USER_PROMPT_START: &str = "<START_OF_USER_PROMPT>";
pub const USER_PROMPT_END: &str = "<END_OF_USER_PROMPT>";

/// Splits a tagged prompt into `(system, user)` when both markers are
/// present; otherwise the whole prompt is treated as user content.
pub fn split_system_prompt(prompt: &str) -> (Option<String>, String) {
    let system = extract_between(prompt, SYSTEM_PROMPT_START, SYSTEM_PROMPT_END);
    let user = extract_between(prompt, USER_PROMPT_START, USER_PROMPT_END);
    match (system, user) {
        (Some(sys), Some(usr)) => (Some(sys), usr),
        _ => (None, prompt.to_string()),
    }
}

/// Issues one completion against `client`, wrapped in the §4.C backoff
/// policy, and collects the full response text plus reported usage. Used
/// by the structure generator and page generator, which both operate on
/// plain strings rather than streams.
pub async fn complete_to_string(
    client: &dyn LlmClient,
    prompt: &str,
    model: &str,
    kwargs: &ModelKwargs,
    mode: CompletionMode,
) -> Result<(String, Usage)> {
    backoff::with_completion_backoff("completion", || async {
        let api_kwargs = client.convert_inputs(prompt, model, kwargs, mode);
        let (mut stream, usage) = client.acall(api_kwargs).await?;
        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            text.push_str(&delta?);
        }
        Ok((text, *usage.lock()))
    })
    .await
}

fn extract_between(s: &str, start: &str, end: &str) -> Option<String> {
    let start_idx = s.find(start)? + start.len();
    let end_idx = s[start_idx..].find(end)? + start_idx;
    Some(s[start_idx..end_idx].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_reasoning_models_by_prefix_or_substring() {
        assert!(is_reasoning_model("o1-preview"));
        assert!(is_reasoning_model("o3-mini"));
        assert!(is_reasoning_model("custom-reasoning-v2"));
        assert!(!is_reasoning_model("gpt-4o"));
    }

    #[test]
    fn splits_tagged_system_and_user_prompts() {
        let prompt = format!(
            "{SYSTEM_PROMPT_START}Be terse.{SYSTEM_PROMPT_END}{USER_PROMPT_START}Explain foo.{USER_PROMPT_END}"
        );
        let (system, user) = split_system_prompt(&prompt);
        assert_eq!(system.as_deref(), Some("Be terse."));
        assert_eq!(user, "Explain foo.");
    }

    #[test]
    fn untagged_prompt_has_no_system_split() {
        let (system, user) = split_system_prompt("just a prompt");
        assert!(system.is_none());
        assert_eq!(user, "just a prompt");
    }

    struct StubStreamingClient;

    #[async_trait]
    impl LlmClient for StubStreamingClient {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        fn convert_inputs(&self, _prompt: &str, _model: &str, _kwargs: &ModelKwargs, _mode: CompletionMode) -> Value {
            Value::Null
        }

        async fn acall(&self, _api_kwargs: Value) -> Result<(CompletionStream, UsageHandle)> {
            let usage = new_usage_handle();
            usage.lock().prompt_tokens = 10;
            usage.lock().completion_tokens = 4;
            let stream = futures::stream::iter(vec![Ok("Hello, ".to_string()), Ok("world.".to_string())]);
            Ok((Box::pin(stream), usage))
        }
    }

    #[tokio::test]
    async fn complete_to_string_collects_deltas_and_usage() {
        let (text, usage) =
            complete_to_string(&StubStreamingClient, "prompt", "gpt-4o", &ModelKwargs::default(), CompletionMode::Llm)
                .await
                .unwrap();
        assert_eq!(text, "Hello, world.");
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 4);
    }
}
