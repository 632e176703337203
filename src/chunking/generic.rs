//! Generic word-based fallback splitter (spec §4.E): used when the
//! language is unsupported, parsing fails, the feature flag is off, or a
//! syntax-aware block exceeds the embedding model's token limit.

use crate::domain::chunk::{Chunk, SyntaxMetadata};

const WORDS_PER_CHUNK: usize = 800;
const OVERLAP_WORDS: usize = 50;

/// Splits `contents` into fixed-size, slightly overlapping word windows.
/// `inherited_metadata`, when given, is copied onto every resulting chunk
/// so a re-split oversized block keeps its original symbol/line metadata.
pub fn split(file_path: &str, contents: &str, inherited_metadata: Option<SyntaxMetadata>) -> Vec<Chunk> {
    let words: Vec<&str> = contents.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + WORDS_PER_CHUNK).min(words.len());
        let text = words[start..end].join(" ");
        let token_count = super::estimate_tokens(&text);
        let mut chunk = Chunk::new(text, file_path, token_count);
        if let Some(meta) = &inherited_metadata {
            chunk.metadata = meta.clone();
        }
        chunks.push(chunk);

        if end == words.len() {
            break;
        }
        start = end.saturating_sub(OVERLAP_WORDS);
        if start == end {
            break;
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_long_text_into_multiple_overlapping_windows() {
        let text = (0..2000).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = split("a.txt", &text, None);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn empty_input_produces_no_chunks() {
        assert!(split("a.txt", "   ", None).is_empty());
    }

    #[test]
    fn inherited_metadata_is_copied_onto_resplit_chunks() {
        let meta = SyntaxMetadata {
            symbol_name: Some("big_fn".into()),
            ..Default::default()
        };
        let text = (0..50).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = split("a.py", &text, Some(meta));
        assert_eq!(chunks[0].metadata.symbol_name.as_deref(), Some("big_fn"));
    }
}
