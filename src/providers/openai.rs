//! OpenAI-style chat completions and embeddings wire shape.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Map, Value};

use super::sse::data_frames;
use super::{CompletionMode, CompletionStream, EmbeddingClient, LlmClient, ModelKwargs, ProviderKind, ProviderQuirks, UsageHandle};
use crate::error::{Error, Result};

const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn convert_inputs(&self, prompt: &str, model: &str, kwargs: &ModelKwargs, _mode: CompletionMode) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), json!(model));
        body.insert(
            "messages".into(),
            json!([{ "role": "user", "content": prompt }]),
        );
        if let Some(t) = kwargs.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(p) = kwargs.top_p {
            body.insert("top_p".into(), json!(p));
        }
        if let Some(f) = kwargs.frequency_penalty {
            body.insert("frequency_penalty".into(), json!(f));
        }
        if let Some(p) = kwargs.presence_penalty {
            body.insert("presence_penalty".into(), json!(p));
        }
        if let Some(m) = kwargs.max_tokens {
            body.insert("max_tokens".into(), json!(m));
        }
        body.insert("stream".into(), json!(true));

        ProviderQuirks::openai().apply(&mut body, model, kwargs, DEFAULT_MAX_TOKENS);
        Value::Object(body)
    }

    async fn acall(&self, api_kwargs: Value) -> Result<(CompletionStream, UsageHandle)> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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

                if let Some(u) = parsed.get("usage") {
                    let mut guard = usage.lock();
                    guard.prompt_tokens = u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0);
                    guard.completion_tokens = u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0);
                }

                let delta = parsed
                    .get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("delta"))
                    .and_then(|d| d.get("content"))
                    .and_then(Value::as_str)
                    .map(str::to_string);

                delta.map(Ok)
            }
        });

        Ok((deltas.boxed(), usage))
    }
}

pub(super) fn classify_http_error(status: reqwest::StatusCode, body: &str) -> Error {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Error::RateLimited { retry_after_secs: 60 };
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Error::TerminalProvider(format!("{status}: {body}"));
    }
    Error::classify_completion_message(body)
}

pub struct OpenAiEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status, &text));
        }

        let body: Value = response.json().await?;
        let data = body.get("data").and_then(Value::as_array).cloned().unwrap_or_default();

        Ok(texts
            .iter()
            .enumerate()
            .map(|(i, _)| {
                data.get(i)
                    .and_then(|entry| entry.get("embedding"))
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(Value::as_f64).map(|v| v as f32).collect::<Vec<f32>>())
                    .filter(|v| !v.is_empty())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_inputs_strips_sampling_for_reasoning_models() {
        crate::ensure_crypto_provider();
        let client = OpenAiClient::new(reqwest::Client::new(), "https://api.openai.com/v1", "key");
        let kwargs = ModelKwargs {
            temperature: Some(0.7),
            ..Default::default()
        };
        let body = client.convert_inputs("hello", "o1-preview", &kwargs, CompletionMode::Llm);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn convert_inputs_keeps_sampling_for_ordinary_models() {
        crate::ensure_crypto_provider();
        let client = OpenAiClient::new(reqwest::Client::new(), "https://api.openai.com/v1", "key");
        let kwargs = ModelKwargs {
            temperature: Some(0.7),
            ..Default::default()
        };
        let body = client.convert_inputs("hello", "gpt-4o", &kwargs, CompletionMode::Llm);
        assert_eq!(body.get("temperature").and_then(Value::as_f64), Some(0.7));
    }

    #[test]
    fn classifies_429_as_rate_limited() {
        let err = classify_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, Error::RateLimited { .. }));
    }
}
