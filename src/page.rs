//! Wire types for Wiki.js page records.

use serde::{Deserialize, Serialize};

/// Declared markup flavor of a page body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    /// Markdown source, eligible for header-based section splitting.
    Markdown,
    /// Rendered or raw HTML; treated as a single untitled section.
    Html,
}

impl From<String> for ContentType {
    fn from(value: String) -> Self {
        // Wiki.js reports "markdown", "html", or editor-specific values;
        // anything that is not html gets the markdown cleaning path.
        if value.eq_ignore_ascii_case("html") {
            Self::Html
        } else {
            Self::Markdown
        }
    }
}

impl From<ContentType> for String {
    fn from(value: ContentType) -> Self {
        match value {
            ContentType::Markdown => "markdown".to_string(),
            ContentType::Html => "html".to_string(),
        }
    }
}

/// Page metadata row returned by the list query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Stable numeric page identifier.
    pub id: i64,
    /// Path slug, without a leading slash.
    pub path: String,
    /// Display title (may be empty).
    #[serde(default)]
    pub title: String,
    /// Whether the page is published.
    #[serde(default)]
    pub is_published: bool,
    /// Whether the page is marked private.
    #[serde(default)]
    pub is_private: bool,
    /// Declared markup flavor.
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Last-modified timestamp as reported by the wiki.
    #[serde(default)]
    pub updated_at: String,
}

fn default_content_type() -> String {
    "markdown".to_string()
}

impl PageMeta {
    /// Eligibility rule for ingestion: published and not private.
    pub fn is_public(&self) -> bool {
        self.is_published && !self.is_private
    }
}

/// Tag wrapper object as returned by the GraphQL single-page query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageTag {
    /// Tag text.
    pub tag: String,
}

/// Full page record returned by the single-page query (or the scrape fallback).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Stable numeric page identifier.
    pub id: i64,
    /// Path slug.
    pub path: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Raw page body in `content_type` markup.
    #[serde(default)]
    pub content: String,
    /// Optional one-line description.
    #[serde(default)]
    pub description: String,
    /// Declared markup flavor of `content`.
    #[serde(default = "ContentType::markdown")]
    pub content_type: ContentType,
    /// Free-form tag list.
    #[serde(default)]
    pub tags: Vec<PageTag>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: String,
    /// Last-modified timestamp.
    #[serde(default)]
    pub updated_at: String,
}

impl ContentType {
    fn markdown() -> Self {
        Self::Markdown
    }
}

impl Page {
    /// Flattens the tag wrapper objects into plain strings.
    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.tag.clone()).collect()
    }
}
