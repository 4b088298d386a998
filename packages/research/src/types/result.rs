//! Per-URL research results.

use serde::{Deserialize, Serialize};

use super::selection::LineSelection;

/// One row of evidence for a URL.
///
/// After validation exactly one of these holds: the row carries usable
/// selections, or it is flagged broken / irrelevant / errored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub viewpoint: String,

    #[serde(default)]
    pub selections: Vec<LineSelection>,

    #[serde(default)]
    pub broken: bool,

    #[serde(default)]
    pub irrelevant: bool,

    #[serde(default)]
    pub error: Option<String>,

    /// Snippet reported by the search provider
    #[serde(default)]
    pub content: Option<String>,

    #[serde(default)]
    pub page_id: Option<String>,

    #[serde(default)]
    pub line_count: Option<usize>,
}

impl SearchResult {
    /// Create an empty row for a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the viewpoint.
    pub fn with_viewpoint(mut self, viewpoint: impl Into<String>) -> Self {
        self.viewpoint = viewpoint.into();
        self
    }

    /// Add a selection.
    pub fn with_selection(mut self, selection: LineSelection) -> Self {
        self.selections.push(selection);
        self
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Mark as broken.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Mark as irrelevant.
    pub fn irrelevant(mut self) -> Self {
        self.irrelevant = true;
        self
    }

    /// Attach an error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Error-only row used when the whole run failed.
    pub fn error_row(index: usize, message: impl Into<String>) -> Self {
        Self {
            url: format!("search://subagent-error/{}", index),
            broken: true,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Any of the status flags is set.
    pub fn is_flagged(&self) -> bool {
        self.broken || self.irrelevant || self.error.is_some()
    }

    /// Carries evidence that can back a reference.
    pub fn has_usable_evidence(&self) -> bool {
        !self.is_flagged() && !self.selections.is_empty()
    }
}
