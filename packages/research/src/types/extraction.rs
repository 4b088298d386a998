//! Extraction types - what the per-URL agent concluded about a page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::normalize::normalize_text;
use super::selection::LineSelection;

/// Output of one extraction agent run over a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentExtraction {
    /// Short claim the page supports
    pub viewpoint: String,

    /// Page content was unavailable or unusable
    pub broken: bool,

    /// Page is unrelated to the query
    pub irrelevant: bool,

    /// Exact line selections backing the viewpoint
    pub selections: Vec<LineSelection>,

    /// Raw arguments of the finalize call (or the last assistant text)
    pub raw_model_output: String,

    /// Why the extraction failed, if it did
    pub error: Option<String>,

    /// The model called `write_extract_result`; only these are cached
    #[serde(skip)]
    pub finalized: bool,
}

impl AgentExtraction {
    /// A broken extraction carrying an explanation.
    pub fn broken(error: impl Into<String>) -> Self {
        Self {
            broken: true,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Enforce flag invariants: flagged extractions carry no selections.
    pub fn normalized(mut self) -> Self {
        if self.broken || self.irrelevant {
            self.selections.clear();
        }
        self
    }
}

/// The cached extraction for one (page, normalized query).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub page_id: String,

    /// Normalized query text; cache key together with `page_id`
    pub query: String,

    pub viewpoint: String,
    pub broken: bool,
    pub irrelevant: bool,
    pub selections: Vec<LineSelection>,
    pub raw_model_output: String,
    pub error: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractionRecord {
    /// Build a record from an agent run.
    pub fn from_agent(page_id: &str, query: &str, extraction: AgentExtraction) -> Self {
        Self {
            page_id: page_id.to_string(),
            query: normalize_text(query),
            viewpoint: extraction.viewpoint,
            broken: extraction.broken,
            irrelevant: extraction.irrelevant,
            selections: extraction.selections,
            raw_model_output: extraction.raw_model_output,
            error: extraction.error,
            extracted_at: Utc::now(),
        }
    }

    /// Turn a cached record back into agent output.
    pub fn into_agent(self) -> AgentExtraction {
        AgentExtraction {
            viewpoint: self.viewpoint,
            broken: self.broken,
            irrelevant: self.irrelevant,
            selections: self.selections,
            raw_model_output: self.raw_model_output,
            error: self.error,
            finalized: true,
        }
    }
}

/// What one orchestrator `extract(url, query)` call produced.
///
/// This is the ground truth the validator checks final claims against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractOutcome {
    pub url: String,
    pub query: String,
    pub title: Option<String>,
    pub page_id: Option<String>,
    pub line_count: Option<usize>,
    pub viewpoint: String,
    pub broken: bool,
    pub irrelevant: bool,
    pub selections: Vec<LineSelection>,
    pub error: Option<String>,

    /// Served from the extraction cache
    #[serde(default)]
    pub cached: bool,
}

impl ExtractOutcome {
    /// An outcome for a page that could not be fetched or read.
    pub fn failed(url: &str, query: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            query: query.to_string(),
            title: None,
            page_id: None,
            line_count: None,
            viewpoint: String::new(),
            broken: true,
            irrelevant: false,
            selections: Vec::new(),
            error: Some(error.into()),
            cached: false,
        }
    }

    /// Whether the outcome carries evidence that can back a claim.
    pub fn is_usable(&self) -> bool {
        !self.broken && !self.irrelevant && self.error.is_none() && !self.selections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flagged_extractions_drop_selections() {
        let extraction = AgentExtraction {
            irrelevant: true,
            selections: vec![LineSelection::new(1, 2, "a\nb")],
            ..Default::default()
        }
        .normalized();
        assert!(extraction.selections.is_empty());
    }

    #[test]
    fn test_record_normalizes_query() {
        let record = ExtractionRecord::from_agent("p1", "  Rust  Futures ", AgentExtraction::default());
        assert_eq!(record.query, "rust futures");
        assert_eq!(
            record.into_agent(),
            AgentExtraction {
                finalized: true,
                ..Default::default()
            }
        );
    }
}
