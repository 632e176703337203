//! Mermaid fenced-block extraction and validation (spec §4.H step 1).
//!
//! An invalid diagram triggers one LLM "fix this diagram" round-trip; if
//! the fix still fails validation, the block is replaced with a one-line
//! notice rather than failing the whole page.

use std::future::Future;

use crate::error::Result;

const KNOWN_PREFIXES: &[&str] = &[
    "graph TD", "graph LR", "graph TB", "graph RL", "graph BT",
    "sequenceDiagram", "classDiagram", "stateDiagram-v2", "stateDiagram",
    "erDiagram", "journey", "gantt", "pie", "gitGraph", "flowchart",
];

/// Scans `content` for ` ```mermaid ` fenced blocks, validating each and
/// invoking `fix` once per invalid diagram. Returns `content` with every
/// block replaced by its fixed or validated-unchanged text.
pub async fn validate_and_fix<G, GFut>(content: &str, fix: &mut G) -> Result<String>
where
    G: FnMut(String) -> GFut,
    GFut: Future<Output = Result<String>>,
{
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    loop {
        let Some(start) = rest.find("```mermaid") else {
            out.push_str(rest);
            break;
        };
        let (before, after_marker) = rest.split_at(start);
        out.push_str(before);

        let body_start = &after_marker["```mermaid".len()..];
        let Some(end_rel) = body_start.find("```") else {
            // Unterminated fence: emit verbatim and stop scanning.
            out.push_str(after_marker);
            break;
        };
        let diagram = &body_start[..end_rel];
        let after_block = &body_start[end_rel + "```".len()..];

        let final_diagram = if is_valid_diagram(diagram) {
            diagram.to_string()
        } else {
            let fix_prompt = format!(
                "The following Mermaid diagram failed validation. Return only a corrected diagram body:\n{diagram}"
            );
            match fix(fix_prompt).await {
                Ok(fixed) if is_valid_diagram(&fixed) => fixed,
                _ => String::new(),
            }
        };

        if final_diagram.is_empty() && !is_valid_diagram(diagram) {
            out.push_str("*[diagram omitted: could not be validated]*\n");
        } else {
            out.push_str("```mermaid");
            if !final_diagram.starts_with('\n') {
                out.push('\n');
            }
            out.push_str(final_diagram.trim_end());
            out.push_str("\n```");
        }

        rest = after_block;
    }

    Ok(out)
}

fn is_valid_diagram(diagram: &str) -> bool {
    let trimmed = diagram.trim_start();
    if !KNOWN_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        return false;
    }
    for line in diagram.lines() {
        if !brackets_balanced(line) {
            return false;
        }
        if !arrows_have_both_endpoints(line) {
            return false;
        }
    }
    true
}

fn brackets_balanced(line: &str) -> bool {
    let mut stack = Vec::new();
    for c in line.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' => {
                if stack.pop() != Some('(') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            '}' => {
                if stack.pop() != Some('{') {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}

fn arrows_have_both_endpoints(line: &str) -> bool {
    const ARROWS: &[&str] = &["-->", "---", "-.->",  "==>", "--x", "--o"];
    for arrow in ARROWS {
        if let Some(pos) = line.find(arrow) {
            let before = line[..pos].trim();
            let after = line[pos + arrow.len()..].trim();
            if before.is_empty() || after.is_empty() {
                return false;
            }
        }
    }
    true
}
