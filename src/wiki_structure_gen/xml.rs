//! XML parsing of the `<wiki_structure>` document (spec §4.G) and the
//! deterministic regex-based rebuild used after the third failed attempt.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use regex::Regex;
use std::str::FromStr;

use crate::domain::page::Importance;
use crate::domain::wiki_structure::{PageMeta, Section, WikiStructure};
use crate::error::{Error, Result};

#[derive(Default)]
struct PageBuilder {
    id: String,
    title: String,
    description: Option<String>,
    importance: Importance,
    relevant_files: Vec<String>,
    related_pages: Vec<String>,
}

#[derive(Default)]
struct SectionBuilder {
    id: String,
    title: String,
    pages: Vec<String>,
    subsections: Vec<String>,
}

/// Parses a cleaned XML document into a `WikiStructure`, failing on any
/// malformed tag or a missing required field.
pub fn parse(xml: &str) -> Result<WikiStructure> {
    let mut reader = Reader::from_str(xml);

    let mut title = None;
    let mut description = None;
    let mut pages = Vec::new();
    let mut sections = Vec::new();

    let mut tag_stack: Vec<String> = Vec::new();
    let mut current_page: Option<PageBuilder> = None;
    let mut current_section: Option<SectionBuilder> = None;
    let mut text_buf = String::new();

    let err = |msg: &str| Error::Validation(format!("malformed wiki_structure XML: {msg}"));

    loop {
        match reader.read_event().map_err(|e| err(&e.to_string()))? {
            Event::Eof => break,
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "page" {
                    let mut builder = PageBuilder::default();
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"id" {
                            builder.id = String::from_utf8_lossy(&attr.value).to_string();
                        }
                    }
                    current_page = Some(builder);
                } else if name == "section" {
                    let mut builder = SectionBuilder::default();
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"id" {
                            builder.id = String::from_utf8_lossy(&attr.value).to_string();
                        }
                    }
                    current_section = Some(builder);
                }
                tag_stack.push(name);
                text_buf.clear();
            }
            Event::Text(t) => {
                text_buf.push_str(&t.unescape().map_err(|e| err(&e.to_string()))?);
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let text = text_buf.trim().to_string();
                text_buf.clear();

                match name.as_str() {
                    "title" if tag_stack.iter().rev().nth(1).map(String::as_str) == Some("wiki_structure") => {
                        title = Some(text);
                    }
                    "description" if tag_stack.iter().rev().nth(1).map(String::as_str) == Some("wiki_structure") => {
                        description = Some(text);
                    }
                    "title" => {
                        if let Some(page) = current_page.as_mut() {
                            page.title = text;
                        } else if let Some(section) = current_section.as_mut() {
                            section.title = text;
                        }
                    }
                    "description" => {
                        if let Some(page) = current_page.as_mut() {
                            page.description = Some(text).filter(|s| !s.is_empty());
                        }
                    }
                    "importance" => {
                        if let Some(page) = current_page.as_mut() {
                            page.importance = Importance::from_str(&text).unwrap_or(Importance::Medium);
                        }
                    }
                    "file" => {
                        if let Some(page) = current_page.as_mut() {
                            page.relevant_files.push(text);
                        }
                    }
                    "page_id" => {
                        if let Some(page) = current_page.as_mut() {
                            page.related_pages.push(text);
                        } else if let Some(section) = current_section.as_mut() {
                            section.pages.push(text);
                        }
                    }
                    "section_id" => {
                        if let Some(section) = current_section.as_mut() {
                            section.subsections.push(text);
                        }
                    }
                    "page" => {
                        if let Some(builder) = current_page.take() {
                            if builder.id.is_empty() || builder.title.is_empty() {
                                return Err(err("page missing required id or title"));
                            }
                            pages.push(PageMeta {
                                id: builder.id,
                                title: builder.title,
                                description: builder.description,
                                importance: builder.importance,
                                relevant_files: builder.relevant_files,
                                related_pages: builder.related_pages,
                                parent_section: None,
                            });
                        }
                    }
                    "section" => {
                        if let Some(builder) = current_section.take() {
                            if builder.id.is_empty() {
                                return Err(err("section missing required id"));
                            }
                            sections.push(Section {
                                id: builder.id,
                                title: builder.title,
                                pages: builder.pages,
                                subsections: builder.subsections,
                            });
                        }
                    }
                    _ => {}
                }
                tag_stack.pop();
            }
            _ => {}
        }
    }

    let title = title.ok_or_else(|| err("missing <title>"))?;
    let description = description.ok_or_else(|| err("missing <description>"))?;
    if pages.is_empty() {
        return Err(err("no <page> elements found"));
    }

    Ok(WikiStructure { title, description, pages, sections })
}

/// Best-effort regex extraction used after the third parse failure (spec
/// §4.G). Never fails unless the text is entirely blank.
pub fn deterministic_rebuild(text: &str) -> Option<WikiStructure> {
    if text.trim().is_empty() {
        return None;
    }

    let title_re = Regex::new(r"(?im)^\s*(?:title|#)\s*[:\-]?\s*(.+)$").ok()?;
    let desc_re = Regex::new(r"(?im)^\s*description\s*[:\-]?\s*(.+)$").ok()?;

    let title = title_re
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| text.lines().find(|l| !l.trim().is_empty()).unwrap_or("Untitled").trim().to_string());

    let description = desc_re
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| "Automatically reconstructed after repeated structure generation failures.".to_string());

    Some(WikiStructure {
        title: escape_xml_text(&title),
        description: escape_xml_text(&description),
        pages: Vec::new(),
        sections: Vec::new(),
    })
}

fn escape_xml_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_XML: &str = r#"<wiki_structure>
        <title>Example</title>
        <description>An example repo</description>
        <pages>
            <page id="p1">
                <title>Overview</title>
                <description>High level summary</description>
                <importance>high</importance>
                <relevant_files><file>src/lib.rs</file></relevant_files>
                <related_pages><page_id>p2</page_id></related_pages>
            </page>
            <page id="p2">
                <title>Usage</title>
                <description></description>
                <importance>medium</importance>
                <relevant_files></relevant_files>
                <related_pages></related_pages>
            </page>
        </pages>
        <sections>
            <section id="s1">
                <title>Root</title>
                <pages><page_id>p1</page_id></pages>
                <subsections><section_id>s2</section_id></subsections>
            </section>
            <section id="s2">
                <title>Child</title>
                <pages><page_id>p2</page_id></pages>
                <subsections></subsections>
            </section>
        </sections>
    </wiki_structure>"#;

    #[test]
    fn parses_pages_and_sections() {
        let structure = parse(VALID_XML).unwrap();
        assert_eq!(structure.title, "Example");
        assert_eq!(structure.pages.len(), 2);
        assert_eq!(structure.pages[0].related_pages, vec!["p2"]);
        assert_eq!(structure.sections.len(), 2);
        assert_eq!(structure.root_sections().len(), 1);
    }

    #[test]
    fn fails_on_missing_page_title() {
        let xml = r#"<wiki_structure><title>T</title><description>D</description>
            <pages><page id="p1"><importance>high</importance></page></pages></wiki_structure>"#;
        assert!(parse(xml).is_err());
    }

    #[test]
    fn fails_when_no_pages_present() {
        let xml = "<wiki_structure><title>T</title><description>D</description><pages></pages></wiki_structure>";
        assert!(parse(xml).is_err());
    }

    #[test]
    fn deterministic_rebuild_extracts_title_and_description_lines() {
        let text = "Title: My Repo\nDescription: does useful things\nirrelevant trailer";
        let structure = deterministic_rebuild(text).unwrap();
        assert_eq!(structure.title, "My Repo");
        assert_eq!(structure.description, "does useful things");
        assert!(structure.pages.is_empty());
    }

    #[test]
    fn deterministic_rebuild_falls_back_to_first_line_without_markers() {
        let structure = deterministic_rebuild("Just some freeform text\nmore text").unwrap();
        assert_eq!(structure.title, "Just some freeform text");
    }

    #[test]
    fn deterministic_rebuild_returns_none_for_blank_input() {
        assert!(deterministic_rebuild("   \n  ").is_none());
    }
}
