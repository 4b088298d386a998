//! Page types - fetched pages and their numbered lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::normalize::normalize_url;

/// A fetched page as stored in the evidence cache.
///
/// Content-addressed by `page_id`, looked up by normalized URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Content hash of (normalized URL, markdown)
    pub page_id: String,

    /// Search session that first fetched the page
    pub search_id: String,

    /// Query active when the page was fetched
    pub query: String,

    /// URL as requested
    pub url: String,

    /// Page title if available
    pub title: Option<String>,

    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,

    /// Number of lines in `markdown`
    pub line_count: usize,

    /// Readable page text
    pub markdown: String,
}

impl PageRecord {
    /// Split the markdown into 1-based addressable lines.
    pub fn lines(&self) -> Vec<String> {
        split_lines(&self.markdown)
    }
}

/// Input for `EvidenceStore::save_page`.
#[derive(Debug, Clone)]
pub struct PageInput {
    pub search_id: String,
    pub query: String,
    pub url: String,
    pub title: Option<String>,
    pub markdown: String,
}

impl PageInput {
    /// Create a page input.
    pub fn new(url: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            search_id: String::new(),
            query: String::new(),
            url: url.into(),
            title: None,
            markdown: markdown.into(),
        }
    }

    /// Attach the owning search session and query.
    pub fn for_search(mut self, search_id: impl Into<String>, query: impl Into<String>) -> Self {
        self.search_id = search_id.into();
        self.query = query.into();
        self
    }

    /// Set the page title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Deterministic page id for this input.
    pub fn page_id(&self) -> String {
        page_id_for(&self.url, &self.markdown)
    }

    /// Materialize the record with a fetch timestamp.
    pub fn into_record(self, fetched_at: DateTime<Utc>) -> PageRecord {
        PageRecord {
            page_id: self.page_id(),
            line_count: line_count(&self.markdown),
            search_id: self.search_id,
            query: self.query,
            url: self.url,
            title: self.title,
            fetched_at,
            markdown: self.markdown,
        }
    }
}

/// Result of `EvidenceStore::save_page`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPage {
    pub page_id: String,
    pub line_count: usize,
}

/// Calculate the content-addressed id of a page.
pub fn page_id_for(url: &str, markdown: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_url(url).as_bytes());
    hasher.update(b"\n");
    hasher.update(markdown.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..24].to_string()
}

/// Split text into lines. `\r\n` is treated as one break and a trailing
/// newline does not produce an extra empty line.
pub fn split_lines(markdown: &str) -> Vec<String> {
    markdown.lines().map(str::to_string).collect()
}

/// Number of addressable lines in a text.
pub fn line_count(markdown: &str) -> usize {
    markdown.lines().count()
}
