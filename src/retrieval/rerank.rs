//! Optional two-stage re-rank (spec §4.F): dedup by cosine similarity
//! against already-kept chunks, then drop low-relevance survivors via a
//! cross-encoder score. Falls back to the unranked vector results on any
//! failure from the cross-encoder step.

use crate::domain::chunk::Chunk;
use crate::error::Result;

use super::cosine_similarity;

const DEDUP_THRESHOLD: f32 = 0.95;
const RELEVANCE_THRESHOLD: f32 = 0.3;
const RERANK_TOP_K: usize = 10;

/// Scores a `(query, chunk)` pair for relevance in `[0, 1]`. A real
/// deployment wires this to a cross-encoder model; tests supply a stub.
pub trait CrossEncoder: Send + Sync {
    fn score(&self, query: &str, chunk_text: &str) -> Result<f32>;
}

/// Deduplicates `candidates` by embedding cosine similarity, keeping the
/// first occurrence of any near-duplicate pair.
pub fn dedup_by_similarity<'a>(candidates: Vec<(&'a Chunk, f32)>) -> Vec<(&'a Chunk, f32)> {
    let mut kept: Vec<(&Chunk, f32)> = Vec::with_capacity(candidates.len());
    'outer: for candidate in candidates {
        if let Some(embedding) = candidate.0.embedding.as_deref() {
            for (kept_chunk, _) in &kept {
                if let Some(kept_embedding) = kept_chunk.embedding.as_deref() {
                    if cosine_similarity(embedding, kept_embedding) >= DEDUP_THRESHOLD {
                        continue 'outer;
                    }
                }
            }
        }
        kept.push(candidate);
    }
    kept
}

/// Re-ranks `candidates` against `query` using `encoder`, dropping results
/// below the relevance threshold and keeping the top-k. Falls back to the
/// original vector-search order unchanged if the encoder errors.
pub fn rerank<'a>(query: &str, candidates: Vec<(&'a Chunk, f32)>, encoder: &dyn CrossEncoder) -> Vec<(&'a Chunk, f32)> {
    let deduped = dedup_by_similarity(candidates.clone());

    let mut scored = Vec::with_capacity(deduped.len());
    for (chunk, vector_score) in &deduped {
        match encoder.score(query, &chunk.text) {
            Ok(score) => scored.push((*chunk, score)),
            Err(_) => return candidates,
        }
    }

    scored.retain(|(_, score)| *score >= RELEVANCE_THRESHOLD);
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(RERANK_TOP_K);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEncoder;
    impl CrossEncoder for StubEncoder {
        fn score(&self, _query: &str, chunk_text: &str) -> Result<f32> {
            Ok(if chunk_text.contains("relevant") { 0.9 } else { 0.1 })
        }
    }

    struct FailingEncoder;
    impl CrossEncoder for FailingEncoder {
        fn score(&self, _query: &str, _chunk_text: &str) -> Result<f32> {
            Err(crate::error::Error::Other("model unavailable".into()))
        }
    }

    fn chunk_with_embedding(text: &str, embedding: Vec<f32>) -> Chunk {
        let mut c = Chunk::new(text, "a.rs", 10);
        c.embedding = Some(embedding);
        c
    }

    #[test]
    fn dedup_drops_near_identical_embeddings() {
        let a = chunk_with_embedding("a", vec![1.0, 0.0]);
        let b = chunk_with_embedding("b", vec![0.999, 0.001]);
        let c = chunk_with_embedding("c", vec![0.0, 1.0]);
        let candidates = vec![(&a, 0.9), (&b, 0.89), (&c, 0.5)];
        let kept = dedup_by_similarity(candidates);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn rerank_drops_low_relevance_chunks() {
        let relevant = chunk_with_embedding("this is relevant", vec![1.0, 0.0]);
        let irrelevant = chunk_with_embedding("off topic", vec![0.0, 1.0]);
        let candidates = vec![(&relevant, 0.9), (&irrelevant, 0.8)];
        let results = rerank("query", candidates, &StubEncoder);
        assert_eq!(results.len(), 1);
        assert!(results[0].0.text.contains("relevant"));
    }

    #[test]
    fn rerank_falls_back_to_vector_order_on_encoder_failure() {
        let a = chunk_with_embedding("a", vec![1.0, 0.0]);
        let b = chunk_with_embedding("b", vec![0.0, 1.0]);
        let candidates = vec![(&a, 0.9), (&b, 0.8)];
        let results = rerank("query", candidates.clone(), &FailingEncoder);
        assert_eq!(results.len(), candidates.len());
    }
}
