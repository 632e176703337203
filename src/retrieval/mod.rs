//! Retrieval (spec §4.F): job-scoped vector index with optional re-rank.

pub mod rerank;

use crate::domain::chunk::Chunk;

const DEFAULT_TOP_K: usize = 10;

/// A job-scoped, in-memory vector index over embedded chunks. Never
/// persisted; rebuilt each time a job enters phase 2 from the chunks
/// produced in phase 0.
#[derive(Default)]
pub struct Index {
    chunks: Vec<Chunk>,
}

impl Index {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Cosine similarity top-k search (spec §4.F default implementation).
    /// `query_vector` must share the index's embedding dimension.
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Vec<(&Chunk, f32)> {
        let mut scored: Vec<(&Chunk, f32)> = self
            .chunks
            .iter()
            .filter_map(|c| c.embedding.as_deref().map(|v| (c, cosine_similarity(query_vector, v))))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k.max(1));
        scored
    }

    pub fn search_default(&self, query_vector: &[f32]) -> Vec<(&Chunk, f32)> {
        self.search(query_vector, DEFAULT_TOP_K)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with_embedding(text: &str, path: &str, embedding: Vec<f32>) -> Chunk {
        let mut c = Chunk::new(text, path, 10);
        c.embedding = Some(embedding);
        c
    }

    #[test]
    fn search_ranks_by_cosine_similarity_descending() {
        let index = Index::new(vec![
            chunk_with_embedding("a", "a.rs", vec![1.0, 0.0]),
            chunk_with_embedding("b", "b.rs", vec![0.0, 1.0]),
            chunk_with_embedding("c", "c.rs", vec![0.9, 0.1]),
        ]);
        let results = index.search(&[1.0, 0.0], 2);
        assert_eq!(results[0].0.file_path, "a.rs");
        assert_eq!(results[1].0.file_path, "c.rs");
    }

    #[test]
    fn chunks_without_an_embedding_are_excluded() {
        let index = Index::new(vec![Chunk::new("a", "a.rs", 10)]);
        assert!(index.search(&[1.0, 0.0], 5).is_empty());
    }

    #[test]
    fn orthogonal_vectors_have_zero_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }
}
