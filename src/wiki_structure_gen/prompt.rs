//! Structure-generation prompt builder (spec §4.G).

const MAX_FILE_TREE_ENTRIES: usize = 500;

const COMPREHENSIVE_SKELETON: &str = "Produce a comprehensive wiki with sections grouping related pages.";
const CONCISE_SKELETON: &str = "Produce a concise wiki with a flat page list and no sections.";

/// Builds the provider-agnostic prompt: owner/repo, a bounded file-tree
/// listing, optional README, language name, and a mode-specific skeleton.
pub fn build_prompt(
    owner: &str,
    repo: &str,
    file_tree: &[String],
    readme: Option<&str>,
    language: &str,
    comprehensive: bool,
) -> String {
    let truncated: Vec<&String> = file_tree.iter().take(MAX_FILE_TREE_ENTRIES).collect();
    let tree_listing = truncated
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "Repository: {owner}/{repo}\nLanguage: {language}\n\nFile tree ({} of {} entries):\n{tree_listing}\n\n",
        truncated.len(),
        file_tree.len(),
    );

    if let Some(readme) = readme {
        prompt.push_str("README:\n");
        prompt.push_str(readme);
        prompt.push_str("\n\n");
    }

    prompt.push_str(if comprehensive { COMPREHENSIVE_SKELETON } else { CONCISE_SKELETON });
    prompt.push_str(
        "\n\nRespond with a single XML document rooted at <wiki_structure> containing <title>, \
         <description>, and <pages> (each <page id=\"...\"> with <title>, <description>, \
         <importance>, <relevant_files>, and <related_pages>)",
    );
    if comprehensive {
        prompt.push_str(", wrapped in an outer <sections> element.");
    } else {
        prompt.push('.');
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_file_tree_to_the_entry_cap() {
        let files: Vec<String> = (0..600).map(|i| format!("file_{i}.rs")).collect();
        let prompt = build_prompt("o", "r", &files, None, "en", true);
        assert!(prompt.contains("500 of 600 entries"));
    }

    #[test]
    fn comprehensive_mode_requests_sections() {
        let prompt = build_prompt("o", "r", &[], None, "en", true);
        assert!(prompt.contains("<sections>"));
    }

    #[test]
    fn concise_mode_omits_sections_request() {
        let prompt = build_prompt("o", "r", &[], None, "en", false);
        assert!(!prompt.contains("wrapped in an outer"));
    }
}
