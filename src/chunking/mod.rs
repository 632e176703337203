//! Embedding + Chunking Pipeline (spec §4.E).

pub mod embed;
pub mod generic;
pub mod syntax;

use crate::domain::chunk::Chunk;

const LARGE_EMBEDDING_TOKEN_LIMIT: usize = 16384;
const DEFAULT_EMBEDDING_TOKEN_LIMIT: usize = 8000;
const MAX_SYNTAX_AWARE_FILE_BYTES: usize = 500_000;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub use_syntax_aware_chunking: bool,
    pub large_embedding_model: bool,
}

impl ChunkingConfig {
    pub fn token_limit(&self) -> usize {
        if self.large_embedding_model {
            LARGE_EMBEDDING_TOKEN_LIMIT
        } else {
            DEFAULT_EMBEDDING_TOKEN_LIMIT
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            use_syntax_aware_chunking: true,
            large_embedding_model: false,
        }
    }
}

/// A minimal estimator used everywhere a real tokenizer is unavailable:
/// `len / 4`, matching the deterministic fallback named in spec §4.H.
pub fn estimate_tokens(text: &str) -> u32 {
    ((text.len() as f32) / 4.0).ceil() as u32
}

/// Recognizes a supported grammar by file extension, falling back to a
/// shebang sniff for extensionless scripts.
pub fn detect_language(file_path: &str, first_line: Option<&str>) -> Option<syntax::Language> {
    let ext = file_path.rsplit('.').next().unwrap_or("");
    let by_ext = match ext {
        "cs" => Some(syntax::Language::CSharp),
        "ts" | "tsx" => Some(syntax::Language::TypeScript),
        "js" | "jsx" | "mjs" | "cjs" => Some(syntax::Language::JavaScript),
        "py" => Some(syntax::Language::Python),
        _ => None,
    };
    by_ext.or_else(|| {
        let line = first_line?;
        if !line.starts_with("#!") {
            return None;
        }
        if line.contains("python") {
            Some(syntax::Language::Python)
        } else if line.contains("node") {
            Some(syntax::Language::JavaScript)
        } else {
            None
        }
    })
}

/// Chunks one file's contents (spec §4.E). Dispatches to the syntax-aware
/// splitter when a language is recognized, the file is under the size
/// ceiling, and the feature flag is on; otherwise falls back to the
/// generic word-based splitter.
pub fn chunk_file(file_path: &str, contents: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let first_line = contents.lines().next();
    let language = detect_language(file_path, first_line);

    let syntax_eligible =
        config.use_syntax_aware_chunking && language.is_some() && contents.len() <= MAX_SYNTAX_AWARE_FILE_BYTES;

    let mut chunks = if syntax_eligible {
        syntax::split(file_path, contents, language.unwrap())
    } else {
        generic::split(file_path, contents, None)
    };

    let limit = config.token_limit();
    let mut resplit = Vec::with_capacity(chunks.len());
    for chunk in chunks.drain(..) {
        if chunk.token_count as usize > limit {
            resplit.extend(generic::split(file_path, &chunk.text, Some(chunk.metadata.clone())));
        } else {
            resplit.push(chunk);
        }
    }
    resplit
}
