//! Embedding stage (spec §4.E): batches chunks to the active embedder,
//! retries empty responses, and drops chunks the embedder could not
//! vectorize rather than indexing a null embedding.

use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::domain::chunk::Chunk;
use crate::error::Result;
use crate::providers::EmbeddingClient;

const MAX_EMPTY_RETRIES: u32 = 3;
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// Embeds `chunks` in batches of `batch_size`, retrying a batch up to 3
/// times (1s/2s/4s backoff) if any vector in the response comes back
/// empty. On final failure the response is used anyway and the affected
/// chunks are dropped by the caller via their `None` embedding.
pub async fn embed_chunks(
    chunks: Vec<Chunk>,
    client: &dyn EmbeddingClient,
    batch_size: usize,
) -> Result<Vec<Chunk>> {
    let mut out = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_batch_with_retry(client, &texts).await?;

        for (chunk, vector) in batch.iter().zip(vectors) {
            if vector.is_none() {
                warn!(file_path = %chunk.file_path, "dropping chunk with empty embedding after retries");
                continue;
            }
            let mut chunk = chunk.clone();
            chunk.embedding = vector;
            out.push(chunk);
        }
    }

    Ok(out)
}

async fn embed_batch_with_retry(client: &dyn EmbeddingClient, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
    let mut last = client.embed(texts).await?;
    for &delay_secs in RETRY_DELAYS_SECS.iter().take(MAX_EMPTY_RETRIES as usize - 1) {
        if last.iter().all(Option::is_some) {
            return Ok(last);
        }
        sleep(Duration::from_secs(delay_secs)).await;
        last = client.embed(texts).await?;
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::providers::ProviderKind;

    struct FlakyEmbedder {
        attempts: AtomicU32,
        succeeds_after: u32,
    }

    #[async_trait]
    impl EmbeddingClient for FlakyEmbedder {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.succeeds_after {
                Ok(texts.iter().map(|_| None).collect())
            } else {
                Ok(texts.iter().map(|_| Some(vec![0.1, 0.2])).collect())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_empty_embeddings_before_giving_up() {
        let client = FlakyEmbedder { attempts: AtomicU32::new(0), succeeds_after: 2 };
        let chunks = vec![Chunk::new("fn a() {}", "a.rs", 4)];
        let result = embed_chunks(chunks, &client, 10).await.unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0].embedding.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn drops_chunks_still_empty_after_all_retries() {
        let client = FlakyEmbedder { attempts: AtomicU32::new(0), succeeds_after: 100 };
        let chunks = vec![Chunk::new("fn a() {}", "a.rs", 4)];
        let result = embed_chunks(chunks, &client, 10).await.unwrap();
        assert!(result.is_empty());
    }
}
