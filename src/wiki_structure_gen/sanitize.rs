//! Pre-parse cleanup of a raw LLM completion (spec §4.G step 1-2): strip
//! fenced code markers, trim whitespace, drop C0 control characters, and
//! escape stray ampersands that would otherwise break XML parsing.

/// Cleans `raw` before it is handed to the XML parser.
pub fn clean(raw: &str) -> String {
    let without_fences = strip_fences(raw.trim());
    let without_controls = strip_control_chars(&without_fences);
    escape_stray_ampersands(&without_controls)
}

fn strip_fences(s: &str) -> String {
    let s = s.trim();
    let s = s.strip_prefix("```xml").or_else(|| s.strip_prefix("```")).unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s).trim().to_string()
}

fn strip_control_chars(s: &str) -> String {
    s.chars().filter(|c| !c.is_control() || *c == '\n' || *c == '\t').collect()
}

/// Escapes `&` that is not already part of a recognized XML entity
/// (`&amp;`, `&lt;`, `&gt;`, `&quot;`, `&apos;`, or a numeric reference).
fn escape_stray_ampersands(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = s[i..].chars().next().unwrap();
        if c == '&' {
            let rest = &s[i..];
            let is_entity = ["&amp;", "&lt;", "&gt;", "&quot;", "&apos;"].iter().any(|e| rest.starts_with(e))
                || rest[1..].starts_with('#');
            if is_entity {
                out.push(c);
            } else {
                out.push_str("&amp;");
            }
        } else {
            out.push(c);
        }
        i += c.len_utf8();
    }
    out
}
