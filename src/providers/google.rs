//! Google-style generateContent API wire shape.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use super::openai::classify_http_error;
use super::sse::data_frames;
use super::{split_system_prompt, CompletionMode, CompletionStream, EmbeddingClient, LlmClient, ModelKwargs, ProviderKind, UsageHandle};
use crate::error::{Error, Result};

pub struct GoogleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl LlmClient for GoogleClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn convert_inputs(&self, prompt: &str, _model: &str, kwargs: &ModelKwargs, _mode: CompletionMode) -> Value {
        let (system, user) = split_system_prompt(prompt);

        let mut generation_config = serde_json::Map::new();
        if let Some(t) = kwargs.temperature {
            generation_config.insert("temperature".into(), json!(t));
        }
        if let Some(p) = kwargs.top_p {
            generation_config.insert("topP".into(), json!(p));
        }
        if let Some(m) = kwargs.max_tokens {
            generation_config.insert("maxOutputTokens".into(), json!(m));
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": user }] }],
            "generationConfig": generation_config,
        });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }

    async fn acall(&self, api_kwargs: Value) -> Result<(CompletionStream, UsageHandle)> {
        let response = self
            .http
            .post(format!("{}:streamGenerateContent?alt=sse&key={}", self.base_url, self.api_key))
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

                if let Some(meta) = parsed.get("usageMetadata") {
                    let mut guard = usage.lock();
                    guard.prompt_tokens = meta.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0);
                    guard.completion_tokens = meta.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0);
                }

                parsed
                    .get("candidates")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("content"))
                    .and_then(|c| c.get("parts"))
                    .and_then(|p| p.get(0))
                    .and_then(|p| p.get("text"))
                    .and_then(Value::as_str)
                    .map(|s| Ok(s.to_string()))
            }
        });

        Ok((deltas.boxed(), usage))
    }
}

pub struct GoogleEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl GoogleEmbeddingClient {
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
impl EmbeddingClient for GoogleEmbeddingClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let requests: Vec<Value> = texts
            .iter()
            .map(|t| json!({ "model": self.model, "content": { "parts": [{ "text": t }] } }))
            .collect();

        let response = self
            .http
            .post(format!("{}:batchEmbedContents?key={}", self.base_url, self.api_key))
            .json(&json!({ "requests": requests }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status, &text));
        }

        let body: Value = response.json().await?;
        let embeddings = body.get("embeddings").and_then(Value::as_array).cloned().unwrap_or_default();

        Ok(texts
            .iter()
            .enumerate()
            .map(|(i, _)| {
                embeddings
                    .get(i)
                    .and_then(|e| e.get("values"))
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
    fn convert_inputs_moves_system_prompt_to_system_instruction() {
        crate::ensure_crypto_provider();
        let client = GoogleClient::new(reqwest::Client::new(), "https://generativelanguage.googleapis.com/v1", "key");
        let prompt = "<START_OF_SYSTEM_PROMPT>Be terse.<END_OF_SYSTEM_PROMPT><START_OF_USER_PROMPT>Hi<END_OF_USER_PROMPT>";
        let body = client.convert_inputs(prompt, "gemini-1.5-pro", &ModelKwargs::default(), CompletionMode::Llm);
        assert!(body.get("systemInstruction").is_some());
    }
}
