//! Ollama-style streaming API: newline-delimited JSON objects rather than
//! SSE `data:` frames.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};

use super::{CompletionMode, CompletionStream, EmbeddingClient, LlmClient, ModelKwargs, ProviderKind, UsageHandle};
use crate::error::{Error, Result};

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn convert_inputs(&self, prompt: &str, model: &str, kwargs: &ModelKwargs, _mode: CompletionMode) -> Value {
        let mut options = serde_json::Map::new();
        if let Some(t) = kwargs.temperature {
            options.insert("temperature".into(), json!(t));
        }
        if let Some(p) = kwargs.top_p {
            options.insert("top_p".into(), json!(p));
        }
        json!({
            "model": model,
            "prompt": prompt,
            "stream": true,
            "options": options,
        })
    }

    async fn acall(&self, api_kwargs: Value) -> Result<(CompletionStream, UsageHandle)> {
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&api_kwargs)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::classify_completion_message(&format!("{status}: {text}")));
        }

        let usage = super::new_usage_handle();
        let usage_for_stream = usage.clone();
        let byte_stream = response.bytes_stream().boxed();

        let deltas = stream::unfold((byte_stream, String::new()), move |(mut bytes, mut buf)| {
            let usage = usage_for_stream.clone();
            async move {
                loop {
                    if let Some(pos) = buf.find('\n') {
                        let line = buf[..pos].to_string();
                        buf.drain(..=pos);
                        if line.trim().is_empty() {
                            continue;
                        }
                        let parsed: Value = match serde_json::from_str(&line) {
                            Ok(v) => v,
                            Err(e) => return Some((Err(Error::Serialization(e)), (bytes, buf))),
                        };
                        if parsed.get("done").and_then(Value::as_bool).unwrap_or(false) {
                            let mut guard = usage.lock();
                            guard.prompt_tokens = parsed.get("prompt_eval_count").and_then(Value::as_u64).unwrap_or(0);
                            guard.completion_tokens = parsed.get("eval_count").and_then(Value::as_u64).unwrap_or(0);
                        }
                        if let Some(text) = parsed.get("response").and_then(Value::as_str) {
                            if !text.is_empty() {
                                return Some((Ok(text.to_string()), (bytes, buf)));
                            }
                        }
                        continue;
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => buf.push_str(&String::from_utf8_lossy(&chunk)),
                        Some(Err(e)) => return Some((Err(Error::Http(e)), (bytes, buf))),
                        None => return None,
                    }
                }
            }
        });

        Ok((deltas.boxed(), usage))
    }
}

pub struct OllamaEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbeddingClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let response = self
                .http
                .post(format!("{}/api/embeddings", self.base_url))
                .json(&json!({ "model": self.model, "prompt": text }))
                .send()
                .await?;

            if !response.status().is_success() {
                out.push(None);
                continue;
            }

            let body: Value = response.json().await?;
            let vec = body
                .get("embedding")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(Value::as_f64).map(|v| v as f32).collect::<Vec<f32>>())
                .filter(|v| !v.is_empty());
            out.push(vec);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_inputs_targets_the_generate_endpoint_shape() {
        crate::ensure_crypto_provider();
        let client = OllamaClient::new(reqwest::Client::new(), "http://localhost:11434");
        let body = client.convert_inputs("hi", "llama3", &ModelKwargs::default(), CompletionMode::Llm);
        assert_eq!(body.get("model").and_then(Value::as_str), Some("llama3"));
        assert_eq!(body.get("stream").and_then(Value::as_bool), Some(true));
    }
}
