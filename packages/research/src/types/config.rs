//! Configuration types for the research pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{ResearchError, Result};

/// Search depth hint passed to the search provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

impl SearchDepth {
    /// Provider wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

impl std::str::FromStr for SearchDepth {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            other => Err(ResearchError::Config(format!("unknown search depth: {other}"))),
        }
    }
}

/// Budgets and guards for one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Model turns before the loop stops without a finalize call.
    pub max_steps: usize,

    /// Total `search` calls allowed.
    pub max_search_calls: usize,

    /// Total `extract` calls allowed.
    pub max_extract_calls: usize,

    /// How many times the same normalized query may be searched.
    pub max_identical_searches: usize,

    /// How many times the same normalized URL may be extracted.
    pub max_identical_extracts: usize,

    /// Results requested from the search provider per call.
    pub max_results_per_search: usize,

    /// Search depth hint.
    pub search_depth: SearchDepth,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: 12,
            max_search_calls: 6,
            max_extract_calls: 12,
            max_identical_searches: 2,
            max_identical_extracts: 1,
            max_results_per_search: 5,
            search_depth: SearchDepth::Basic,
        }
    }
}

/// Limits for the per-URL extraction agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractAgentConfig {
    /// Model turns before giving up on a finalize call.
    pub max_steps: usize,

    /// Lines shown up front when a document is large.
    pub preview_lines: usize,

    /// Documents with more lines than this are previewed.
    pub large_line_threshold: usize,

    /// Documents with more characters than this are previewed.
    pub large_char_threshold: usize,

    /// `grep` match limit when the model does not pass one.
    pub grep_default_max_matches: usize,

    /// Hard ceiling on `grep` matches.
    pub grep_hard_max_matches: usize,

    /// Longest span one `read_lines` call may return.
    pub read_lines_max_span: usize,
}

impl Default for ExtractAgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            preview_lines: 200,
            large_line_threshold: 400,
            large_char_threshold: 40_000,
            grep_default_max_matches: 20,
            grep_hard_max_matches: 100,
            read_lines_max_span: 300,
        }
    }
}

/// Reference building limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Selections turned into references per result.
    pub max_selections_per_result: usize,

    /// Characters kept from each selection's text.
    pub max_text_chars: usize,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            max_selections_per_result: 3,
            max_text_chars: 1200,
        }
    }
}

/// Citation linking limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationConfig {
    /// Widest `[a-b]` range that is expanded.
    pub max_range_width: usize,
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self { max_range_width: 8 }
    }
}

/// Configuration for the whole research pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub extract: ExtractAgentConfig,

    #[serde(default)]
    pub references: ReferenceConfig,

    #[serde(default)]
    pub citations: CitationConfig,
}

impl ResearchConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load defaults, then apply `RESEARCH_*` environment overrides.
    ///
    /// Reads a `.env` file if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from any key lookup (environment, test map).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let o = &mut self.orchestrator;
        override_usize(&lookup, "RESEARCH_MAX_STEPS", &mut o.max_steps)?;
        override_usize(&lookup, "RESEARCH_MAX_SEARCH_CALLS", &mut o.max_search_calls)?;
        override_usize(&lookup, "RESEARCH_MAX_EXTRACT_CALLS", &mut o.max_extract_calls)?;
        override_usize(
            &lookup,
            "RESEARCH_MAX_IDENTICAL_SEARCHES",
            &mut o.max_identical_searches,
        )?;
        override_usize(
            &lookup,
            "RESEARCH_MAX_IDENTICAL_EXTRACTS",
            &mut o.max_identical_extracts,
        )?;
        override_usize(
            &lookup,
            "RESEARCH_MAX_RESULTS_PER_SEARCH",
            &mut o.max_results_per_search,
        )?;
        if let Some(depth) = lookup("RESEARCH_SEARCH_DEPTH") {
            o.search_depth = depth.parse()?;
        }

        let e = &mut self.extract;
        override_usize(&lookup, "RESEARCH_EXTRACT_MAX_STEPS", &mut e.max_steps)?;
        override_usize(&lookup, "RESEARCH_EXTRACT_PREVIEW_LINES", &mut e.preview_lines)?;

        override_usize(
            &lookup,
            "RESEARCH_REFERENCE_MAX_CHARS",
            &mut self.references.max_text_chars,
        )?;
        Ok(())
    }

    /// Replace the orchestrator budgets.
    pub fn with_orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    /// Replace the extraction agent limits.
    pub fn with_extract(mut self, extract: ExtractAgentConfig) -> Self {
        self.extract = extract;
        self
    }

    /// Set the search call budget.
    pub fn with_max_search_calls(mut self, max: usize) -> Self {
        self.orchestrator.max_search_calls = max;
        self
    }

    /// Set the extract call budget.
    pub fn with_max_extract_calls(mut self, max: usize) -> Self {
        self.orchestrator.max_extract_calls = max;
        self
    }

    /// Set the orchestrator step limit.
    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.orchestrator.max_steps = max;
        self
    }
}

fn override_usize(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut usize,
) -> Result<()> {
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| ResearchError::Config(format!("{key} must be a non-negative integer, got {raw:?}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("RESEARCH_MAX_SEARCH_CALLS", "3"),
            ("RESEARCH_SEARCH_DEPTH", "advanced"),
        ]
        .into_iter()
        .collect();

        let mut config = ResearchConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.orchestrator.max_search_calls, 3);
        assert_eq!(config.orchestrator.search_depth, SearchDepth::Advanced);
        assert_eq!(config.orchestrator.max_extract_calls, 12);
    }

    #[test]
    fn test_malformed_override_is_config_error() {
        let mut config = ResearchConfig::default();
        let err = config
            .apply_overrides(|k| (k == "RESEARCH_MAX_STEPS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ResearchError::Config(_)));
    }
}
