//! Per-run budgets and anti-loop guards for orchestrator tool calls.
//!
//! Counters belong to one run and are never shared. A blocked call still
//! counts against the budget.

use std::collections::HashMap;

use crate::error::{ToolFailure, ToolKind};
use crate::types::config::OrchestratorConfig;
use crate::types::normalize::{normalize_text, normalize_url};

#[derive(Debug, Default)]
struct Counter {
    total: usize,
    by_key: HashMap<String, usize>,
}

impl Counter {
    fn admit(
        &mut self,
        tool: ToolKind,
        key: String,
        budget: usize,
        repeat_limit: usize,
    ) -> Result<(), ToolFailure> {
        self.total += 1;
        let seen = self.by_key.entry(key.clone()).or_insert(0);
        *seen += 1;

        if self.total > budget {
            return Err(ToolFailure::ToolBudgetExceeded {
                tool,
                attempt: self.total,
                limit: budget,
            });
        }
        if *seen > repeat_limit {
            return Err(ToolFailure::RepeatedCallBlocked {
                tool,
                key,
                count: *seen - 1,
                limit: repeat_limit,
            });
        }
        Ok(())
    }
}

/// Budget and repeat guard for one orchestrator run.
#[derive(Debug)]
pub struct CallGuard {
    max_search_calls: usize,
    max_extract_calls: usize,
    max_identical_searches: usize,
    max_identical_extracts: usize,
    searches: Counter,
    extracts: Counter,
}

impl CallGuard {
    /// Create a guard from orchestrator limits.
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            max_search_calls: config.max_search_calls,
            max_extract_calls: config.max_extract_calls,
            max_identical_searches: config.max_identical_searches,
            max_identical_extracts: config.max_identical_extracts,
            searches: Counter::default(),
            extracts: Counter::default(),
        }
    }

    /// Admit a `search` call for `query`.
    pub fn admit_search(&mut self, query: &str) -> Result<(), ToolFailure> {
        self.searches.admit(
            ToolKind::Search,
            normalize_text(query),
            self.max_search_calls,
            self.max_identical_searches,
        )
    }

    /// Admit an `extract` call for `url`.
    pub fn admit_extract(&mut self, url: &str) -> Result<(), ToolFailure> {
        self.extracts.admit(
            ToolKind::Extract,
            normalize_url(url),
            self.max_extract_calls,
            self.max_identical_extracts,
        )
    }

    /// Search calls attempted so far, blocked ones included.
    pub fn search_calls(&self) -> usize {
        self.searches.total
    }

    /// Extract calls attempted so far, blocked ones included.
    pub fn extract_calls(&self) -> usize {
        self.extracts.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(searches: usize, repeats: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            max_search_calls: searches,
            max_identical_searches: repeats,
            max_extract_calls: 2,
            max_identical_extracts: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_budget_blocks_and_still_counts() {
        let mut guard = CallGuard::new(&config(2, 5));
        assert!(guard.admit_search("a").is_ok());
        assert!(guard.admit_search("b").is_ok());

        let err = guard.admit_search("c").unwrap_err();
        assert_eq!(
            err,
            ToolFailure::ToolBudgetExceeded {
                tool: ToolKind::Search,
                attempt: 3,
                limit: 2
            }
        );
        assert_eq!(guard.search_calls(), 3);
    }

    #[test]
    fn test_repeat_key_is_normalized() {
        let mut guard = CallGuard::new(&config(10, 1));
        assert!(guard.admit_search("Rust  Async").is_ok());
        assert!(matches!(
            guard.admit_search(" rust async "),
            Err(ToolFailure::RepeatedCallBlocked { count: 1, limit: 1, .. })
        ));
    }

    #[test]
    fn test_extract_repeat_uses_normalized_url() {
        let mut guard = CallGuard::new(&config(10, 1));
        assert!(guard.admit_extract("https://Example.com/a/").is_ok());
        assert!(guard.admit_extract("https://example.com/a#top").is_err());
        assert_eq!(guard.extract_calls(), 2);
    }
}
