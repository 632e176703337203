//! Anthropic-style messages API wire shape.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Map, Value};

use super::openai::classify_http_error;
use super::sse::data_frames;
use super::{split_system_prompt, CompletionMode, CompletionStream, LlmClient, ModelKwargs, ProviderKind, ProviderQuirks, UsageHandle};
use crate::error::{Error, Result};

const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_version: String,
}

impl AnthropicClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn convert_inputs(&self, prompt: &str, model: &str, kwargs: &ModelKwargs, _mode: CompletionMode) -> Value {
        let (system, user) = split_system_prompt(prompt);

        let mut body = Map::new();
        body.insert("model".into(), json!(model));
        body.insert("messages".into(), json!([{ "role": "user", "content": user }]));
        if let Some(system) = system {
            body.insert("system".into(), json!(system));
        }
        if let Some(t) = kwargs.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(p) = kwargs.top_p {
            body.insert("top_p".into(), json!(p));
        }
        if let Some(m) = kwargs.max_tokens {
            body.insert("max_tokens".into(), json!(m));
        }
        body.insert("stream".into(), json!(true));

        ProviderQuirks::anthropic().apply(&mut body, model, kwargs, DEFAULT_MAX_TOKENS);
        Value::Object(body)
    }

    async fn acall(&self, api_kwargs: Value) -> Result<(CompletionStream, UsageHandle)> {
        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&api_kwargs)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status, &text));
        }

        let usage = super::new_usage_handle();
        let usage_for_stream = usage.clone();

        let deltas = data_frames(response).filter_map(move |frame| {
            let usage = usage_for_stream.clone();
            async move {
                let payload = match frame {
                    Ok(p) => p,
                    Err(e) => return Some(Err(e)),
                };
                let parsed: Value = match serde_json::from_str(&payload) {
                    Ok(v) => v,
                    Err(e) => return Some(Err(Error::Serialization(e))),
                };

                match parsed.get("type").and_then(Value::as_str) {
                    Some("content_block_delta") => parsed
                        .get("delta")
                        .and_then(|d| d.get("text"))
                        .and_then(Value::as_str)
                        .map(|s| Ok(s.to_string())),
                    Some("message_delta") => {
                        if let Some(u) = parsed.get("usage") {
                            let mut guard = usage.lock();
                            guard.completion_tokens = u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
                        }
                        None
                    }
                    Some("message_start") => {
                        if let Some(u) = parsed.get("message").and_then(|m| m.get("usage")) {
                            let mut guard = usage.lock();
                            guard.prompt_tokens = u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
                        }
                        None
                    }
                    // ping / content_block_start / message_stop are heartbeat or
                    // role-only frames per spec §4.C streaming normalization.
                    _ => None,
                }
            }
        });

        Ok((deltas.boxed(), usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_inputs_splits_tagged_system_prompt() {
        crate::ensure_crypto_provider();
        let client = AnthropicClient::new(reqwest::Client::new(), "https://api.anthropic.com/v1", "key");
        let prompt = "<START_OF_SYSTEM_PROMPT>Be terse.<END_OF_SYSTEM_PROMPT><START_OF_USER_PROMPT>Hi<END_OF_USER_PROMPT>";
        let body = client.convert_inputs(prompt, "claude-3-5-sonnet", &ModelKwargs::default(), CompletionMode::Llm);
        assert_eq!(body.get("system").and_then(Value::as_str), Some("Be terse."));
    }

    #[test]
    fn convert_inputs_always_carries_max_tokens() {
        crate::ensure_crypto_provider();
        let client = AnthropicClient::new(reqwest::Client::new(), "https://api.anthropic.com/v1", "key");
        let body = client.convert_inputs("hi", "claude-3-5-sonnet", &ModelKwargs::default(), CompletionMode::Llm);
        assert!(body.get("max_tokens").is_some());
        assert!(body.get("stream").is_none());
    }
}
