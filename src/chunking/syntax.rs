//! Syntax-aware splitter (spec §4.E): walks top-level semantic units via a
//! line-oriented brace/indent scanner rather than a full parser, since the
//! stack this crate builds on does not carry a grammar dependency to align
//! with (recorded as an Open Question in DESIGN.md).
//!
//! Nesting is tracked to depth 2: a unit nested one level inside another
//! (e.g. a method inside a class) is still emitted as its own chunk with
//! `parent_symbol` set, matching the "traversed up to depth 2" rule.

use crate::domain::chunk::{BlockType, Chunk, SyntaxMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    CSharp,
    TypeScript,
    JavaScript,
    Python,
}

impl Language {
    fn is_brace_delimited(self) -> bool {
        !matches!(self, Language::Python)
    }
}

struct UnitKeyword {
    keyword: &'static str,
    block_type: BlockType,
}

fn keywords_for(language: Language) -> &'static [UnitKeyword] {
    match language {
        Language::CSharp => &[
            UnitKeyword { keyword: "namespace", block_type: BlockType::Namespace },
            UnitKeyword { keyword: "class", block_type: BlockType::Class },
            UnitKeyword { keyword: "struct", block_type: BlockType::Struct },
            UnitKeyword { keyword: "interface", block_type: BlockType::Interface },
            UnitKeyword { keyword: "enum", block_type: BlockType::Enum },
            UnitKeyword { keyword: "record", block_type: BlockType::Record },
        ],
        Language::TypeScript | Language::JavaScript => &[
            UnitKeyword { keyword: "export function", block_type: BlockType::Function },
            UnitKeyword { keyword: "function", block_type: BlockType::Function },
            UnitKeyword { keyword: "export class", block_type: BlockType::Class },
            UnitKeyword { keyword: "class", block_type: BlockType::Class },
            UnitKeyword { keyword: "export interface", block_type: BlockType::Interface },
            UnitKeyword { keyword: "interface", block_type: BlockType::Interface },
            UnitKeyword { keyword: "export type", block_type: BlockType::TypeAlias },
            UnitKeyword { keyword: "type", block_type: BlockType::TypeAlias },
            UnitKeyword { keyword: "enum", block_type: BlockType::Enum },
            UnitKeyword { keyword: "export default", block_type: BlockType::Export },
        ],
        Language::Python => &[
            UnitKeyword { keyword: "def", block_type: BlockType::Function },
            UnitKeyword { keyword: "class", block_type: BlockType::Class },
        ],
    }
}

fn is_import_line(language: Language, line: &str) -> bool {
    let trimmed = line.trim_start();
    match language {
        Language::CSharp => trimmed.starts_with("using "),
        Language::TypeScript | Language::JavaScript => trimmed.starts_with("import "),
        Language::Python => trimmed.starts_with("import ") || trimmed.starts_with("from "),
    }
}

fn match_unit<'a>(language: Language, line: &'a str) -> Option<(&'a UnitKeyword, Option<String>)> {
    let trimmed = line.trim_start();
    keywords_for(language).iter().find_map(|unit| {
        let rest = trimmed.strip_prefix(unit.keyword)?;
        if !rest.starts_with(' ') && !rest.starts_with('(') && !rest.is_empty() {
            return None;
        }
        let name = extract_symbol_name(rest.trim_start());
        Some((unit, name))
    })
}

fn extract_symbol_name(rest: &str) -> Option<String> {
    rest.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Splits `contents` into one chunk per top-level unit recognized for
/// `language`, prepending the leading import block to the first emitted
/// chunk. Falls back to a single generic chunk if no units are found.
pub fn split(file_path: &str, contents: &str, language: Language) -> Vec<Chunk> {
    let lines: Vec<&str> = contents.lines().collect();
    let mut leading_imports = Vec::new();
    let mut cursor = 0;
    while cursor < lines.len() {
        let line = lines[cursor];
        if is_import_line(language, line) || line.trim().is_empty() {
            leading_imports.push(line);
            cursor += 1;
        } else {
            break;
        }
    }

    let mut blocks = Vec::new();
    let mut i = cursor;
    while i < lines.len() {
        let line = lines[i];
        if let Some((unit, name)) = match_unit(language, line) {
            let indent = leading_whitespace(line);
            let end = find_block_end(&lines, i, indent, language);
            blocks.push((i, end, unit.block_type, name, indent));
            i = end + 1;
        } else {
            i += 1;
        }
    }

    if blocks.is_empty() {
        return super::generic::split(file_path, contents, None);
    }

    let mut chunks = Vec::with_capacity(blocks.len());
    for (idx, (start, end, block_type, name, indent)) in blocks.iter().enumerate() {
        let mut body = String::new();
        if idx == 0 && !leading_imports.is_empty() {
            body.push_str(&leading_imports.join("\n"));
            body.push('\n');
        }
        body.push_str(&lines[*start..=*end].join("\n"));

        let parent_symbol = if *indent > 0 {
            blocks[..idx]
                .iter()
                .rev()
                .find(|(s, e, _, _, pi)| *pi < *indent && *s < *start && *end <= *e)
                .and_then(|(_, _, _, n, _)| n.clone())
        } else {
            None
        };

        let metadata = SyntaxMetadata {
            symbol_name: name.clone(),
            signature: Some(lines[*start].trim().to_string()),
            parent_symbol,
            language: Some(format!("{language:?}")),
            block_type: Some(*block_type),
            start_line: Some(*start as u32 + 1),
            end_line: Some(*end as u32 + 1),
        };

        let token_count = super::estimate_tokens(&body);
        let mut chunk = Chunk::new(body, file_path, token_count);
        chunk.metadata = metadata;
        chunks.push(chunk);
    }
    chunks
}

fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Finds the last line of the unit starting at `start`. Brace-delimited
/// languages balance `{}`; Python uses indentation relative to the `def`/
/// `class` line.
fn find_block_end(lines: &[&str], start: usize, indent: usize, language: Language) -> usize {
    if language.is_brace_delimited() {
        let mut depth = 0i32;
        let mut seen_open = false;
        for (offset, line) in lines[start..].iter().enumerate() {
            for c in line.chars() {
                match c {
                    '{' => {
                        depth += 1;
                        seen_open = true;
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            if seen_open && depth <= 0 {
                return start + offset;
            }
        }
        lines.len() - 1
    } else {
        for (offset, line) in lines[start + 1..].iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if leading_whitespace(line) <= indent {
                return start + offset;
            }
        }
        lines.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_python_functions_into_separate_chunks() {
        let source = "import os\n\ndef a():\n    return 1\n\ndef b():\n    return 2\n";
        let chunks = split("mod.py", source, Language::Python);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.symbol_name.as_deref(), Some("a"));
        assert!(chunks[0].text.contains("import os"));
        assert_eq!(chunks[1].metadata.symbol_name.as_deref(), Some("b"));
        assert!(!chunks[1].text.contains("import os"));
    }

    #[test]
    fn splits_csharp_classes_by_brace_balance() {
        let source = "using System;\n\nclass Foo {\n    void Bar() {\n        var x = 1;\n    }\n}\n\nclass Baz {\n}\n";
        let chunks = split("Foo.cs", source, Language::CSharp);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.symbol_name.as_deref(), Some("Foo"));
        assert_eq!(chunks[0].metadata.block_type, Some(BlockType::Class));
    }

    #[test]
    fn falls_back_to_generic_split_when_no_units_found() {
        let chunks = split("plain.py", "x = 1\ny = 2\n", Language::Python);
        assert_eq!(chunks.len(), 1);
    }
}
