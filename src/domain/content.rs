//! Page and section content snapshots.
//!
//! A [`ContentSnapshot`] is built wholesale from validated rows and never
//! mutated after it is published; consumers receive it behind an `Arc`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::rows::ContentRow;

/// Free-form structured content of a single section.
pub type SectionContent = Map<String, Value>;

/// All sections of one page, keyed by section key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageContent {
    sections: BTreeMap<String, SectionContent>,
}

impl PageContent {
    pub fn section(&self, section_key: &str) -> Option<&SectionContent> {
        self.sections.get(section_key)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &SectionContent)> {
        self.sections
            .iter()
            .map(|(key, content)| (key.as_str(), content))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl FromIterator<(String, SectionContent)> for PageContent {
    fn from_iter<I: IntoIterator<Item = (String, SectionContent)>>(iter: I) -> Self {
        Self {
            sections: iter.into_iter().collect(),
        }
    }
}

/// Every known page, keyed by page key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentSnapshot {
    pages: BTreeMap<String, PageContent>,
}

impl ContentSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reshape flat `(page, section, content)` rows into the nested snapshot.
    ///
    /// A later row for the same page/section pair replaces an earlier one.
    pub fn from_rows(rows: impl IntoIterator<Item = ContentRow>) -> Self {
        let mut pages: BTreeMap<String, PageContent> = BTreeMap::new();
        for row in rows {
            pages
                .entry(row.page_key)
                .or_default()
                .sections
                .insert(row.section_key, row.section_content);
        }
        Self { pages }
    }

    pub fn page(&self, page_key: &str) -> Option<&PageContent> {
        self.pages.get(page_key)
    }

    pub fn pages(&self) -> impl Iterator<Item = (&str, &PageContent)> {
        self.pages.iter().map(|(key, page)| (key.as_str(), page))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
