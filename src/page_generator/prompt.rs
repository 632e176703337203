//! Per-page prompt assembly (spec §4.H): title, candidate files, style
//! rules, a required `<details>` header, language instructions, and
//! retrieved context grouped by file.

use crate::domain::chunk::Chunk;
use crate::domain::wiki_structure::PageMeta;

const STYLE_RULES: &str = "Write in clear, direct technical prose. Use Markdown headings that mirror \
the page title hierarchy. Prefer short paragraphs and bulleted lists over long blocks of text. Cite \
source files inline as `path/to/file.rs` when describing behavior that lives there.";

/// Builds the generation prompt for `page`, grouping retrieved `context`
/// chunks by `file_path` in the order they were retrieved.
pub fn build_page_prompt(page: &PageMeta, language: &str, context: &[(&Chunk, f32)]) -> String {
    let mut prompt = format!("# Page: {}\n\n", page.title);
    if let Some(description) = &page.description {
        prompt.push_str(description);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Candidate source files:\n");
    for file in &page.relevant_files {
        prompt.push_str("- ");
        prompt.push_str(file);
        prompt.push('\n');
    }
    prompt.push('\n');

    prompt.push_str(STYLE_RULES);
    prompt.push_str(&format!("\n\nPrimary language: {language}.\n\n"));

    prompt.push_str(
        "Begin the page with a `<details>` block listing every source file referenced, for example:\n\
         <details>\nSources:\n- path/to/file.rs\n</details>\n\n",
    );

    if !context.is_empty() {
        prompt.push_str("Retrieved context, grouped by file:\n\n");
        let mut by_file: Vec<(&str, Vec<&Chunk>)> = Vec::new();
        for (chunk, _score) in context {
            match by_file.iter_mut().find(|(path, _)| *path == chunk.file_path) {
                Some((_, chunks)) => chunks.push(chunk),
                None => by_file.push((chunk.file_path.as_str(), vec![chunk])),
            }
        }
        for (file_path, chunks) in by_file {
            prompt.push_str(&format!("### {file_path}\n"));
            for chunk in chunks {
                prompt.push_str("```\n");
                prompt.push_str(&chunk.text);
                prompt.push_str("\n```\n");
            }
            prompt.push('\n');
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::page::Importance;

    fn page() -> PageMeta {
        PageMeta {
            id: "p1".into(),
            title: "Overview".into(),
            description: Some("High level summary".into()),
            importance: Importance::High,
            relevant_files: vec!["src/lib.rs".into()],
            related_pages: vec![],
            parent_section: None,
        }
    }

    #[test]
    fn includes_title_files_and_details_header() {
        let prompt = build_page_prompt(&page(), "rust", &[]);
        assert!(prompt.contains("Page: Overview"));
        assert!(prompt.contains("src/lib.rs"));
        assert!(prompt.contains("<details>"));
    }

    #[test]
    fn groups_context_chunks_by_file_path() {
        let chunk_a = Chunk::new("fn a() {}", "a.rs", 4);
        let chunk_b = Chunk::new("fn b() {}", "a.rs", 4);
        let context: Vec<(&Chunk, f32)> = vec![(&chunk_a, 0.9), (&chunk_b, 0.8)];
        let prompt = build_page_prompt(&page(), "rust", &context);
        assert_eq!(prompt.matches("### a.rs").count(), 1);
        assert!(prompt.contains("fn a()"));
        assert!(prompt.contains("fn b()"));
    }
}
