//! Parsed document model
//!
//! [`DocumentData`] is what a parser extracts from one response. It is plain
//! data so it can cross the process boundary. [`ParsedDocument`] wraps it for
//! the cache and implements [`Releasable`].

use docpool_foundation::{Releasable, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Extracted records
// ============================================================================

/// `<meta>` 태그 속성
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MetaTag {
    pub attributes: BTreeMap<String, String>,
}

impl MetaTag {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }
}

/// Form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// HTML form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    /// Resolved action URL
    pub action: String,
    /// Upper-case method, `GET` when absent
    pub method: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
}

/// Lightweight tag record returned by filtered tag queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            text: None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }
}

// ============================================================================
// DocumentData
// ============================================================================

/// Everything a parser extracted from one response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentData {
    /// Name of the parser that produced this document
    pub parser: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub meta_tags: Vec<MetaTag>,
    /// `<meta http-equiv="refresh">` content values
    #[serde(default)]
    pub meta_redirects: Vec<String>,
    #[serde(default)]
    pub forms: Vec<Form>,
    /// References found by walking the markup
    #[serde(default)]
    pub references: Vec<String>,
    /// References found by regular expressions over the raw body
    #[serde(default)]
    pub re_references: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
}

impl DocumentData {
    pub fn new(parser: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            parser: parser.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Rough retained size, used for the cache byte budget
    pub fn estimated_size(&self) -> usize {
        let strings = |v: &[String]| v.iter().map(|s| s.len()).sum::<usize>();
        let metas: usize = self
            .meta_tags
            .iter()
            .flat_map(|m| m.attributes.iter())
            .map(|(k, v)| k.len() + v.len())
            .sum();
        let forms: usize = self
            .forms
            .iter()
            .map(|f| {
                f.action.len()
                    + f.fields
                        .iter()
                        .map(|x| x.name.len() + x.value.as_ref().map_or(0, |v| v.len()))
                        .sum::<usize>()
            })
            .sum();

        self.url.len()
            + self.title.as_ref().map_or(0, |t| t.len())
            + strings(&self.comments)
            + strings(&self.meta_redirects)
            + strings(&self.references)
            + strings(&self.re_references)
            + strings(&self.emails)
            + metas
            + forms
    }
}

// ============================================================================
// ParsedDocument
// ============================================================================

/// Cached parse result
///
/// After [`Releasable::release`] every accessor returns empty results.
#[derive(Debug)]
pub struct ParsedDocument {
    parser: String,
    url: String,
    size: usize,
    data: RwLock<Option<Arc<DocumentData>>>,
}

impl ParsedDocument {
    pub fn new(data: DocumentData) -> Self {
        Self {
            parser: data.parser.clone(),
            url: data.url.clone(),
            size: data.estimated_size(),
            data: RwLock::new(Some(Arc::new(data))),
        }
    }

    pub fn parser_name(&self) -> &str {
        &self.parser
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_released(&self) -> bool {
        self.data.read().is_none()
    }

    /// Shared view of the extracted data, `None` once released
    pub fn snapshot(&self) -> Option<Arc<DocumentData>> {
        self.data.read().clone()
    }

    fn with_data<T: Default>(&self, f: impl FnOnce(&DocumentData) -> T) -> T {
        match self.data.read().as_deref() {
            Some(data) => f(data),
            None => T::default(),
        }
    }

    pub fn title(&self) -> Option<String> {
        self.with_data(|d| d.title.clone())
    }

    pub fn comments(&self) -> Vec<String> {
        self.with_data(|d| d.comments.clone())
    }

    pub fn meta_tags(&self) -> Vec<MetaTag> {
        self.with_data(|d| d.meta_tags.clone())
    }

    pub fn meta_redirects(&self) -> Vec<String> {
        self.with_data(|d| d.meta_redirects.clone())
    }

    pub fn forms(&self) -> Vec<Form> {
        self.with_data(|d| d.forms.clone())
    }

    /// `(parsed, re_references)`
    pub fn references(&self) -> (Vec<String>, Vec<String>) {
        self.with_data(|d| (d.references.clone(), d.re_references.clone()))
    }

    /// E-mail addresses, optionally only those at `domain`
    pub fn emails(&self, domain: Option<&str>) -> Vec<String> {
        self.with_data(|d| match domain {
            Some(domain) => d
                .emails
                .iter()
                .filter(|e| {
                    e.rsplit_once('@')
                        .map(|(_, host)| host.eq_ignore_ascii_case(domain))
                        .unwrap_or(false)
                })
                .cloned()
                .collect(),
            None => d.emails.clone(),
        })
    }
}

impl From<DocumentData> for ParsedDocument {
    fn from(data: DocumentData) -> Self {
        Self::new(data)
    }
}

impl Releasable for ParsedDocument {
    fn release(&self) -> Result<()> {
        if self.data.write().take().is_some() {
            debug!(url = %self.url, parser = %self.parser, "released parsed document");
        }
        Ok(())
    }

    fn size_hint(&self) -> usize {
        self.size
    }
}
