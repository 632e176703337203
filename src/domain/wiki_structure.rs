//! Canonical wiki structure object produced by §4.G after XML validation.

use serde::{Deserialize, Serialize};

use crate::domain::page::Importance;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMeta {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(with = "importance_serde")]
    pub importance: Importance,
    pub relevant_files: Vec<String>,
    pub related_pages: Vec<String>,
    pub parent_section: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub pages: Vec<String>,
    pub subsections: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiStructure {
    pub title: String,
    pub description: String,
    pub pages: Vec<PageMeta>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl WikiStructure {
    /// Sections not referenced as any other section's subsection (spec §4.G).
    pub fn root_sections(&self) -> Vec<&Section> {
        let referenced: std::collections::HashSet<&str> = self
            .sections
            .iter()
            .flat_map(|s| s.subsections.iter().map(String::as_str))
            .collect();
        self.sections
            .iter()
            .filter(|s| !referenced.contains(s.id.as_str()))
            .collect()
    }
}

mod importance_serde {
    use super::Importance;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(v: &Importance, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Importance, D::Error> {
        let s = String::deserialize(d)?;
        Importance::from_str(&s).map_err(serde::de::Error::custom)
    }
}
