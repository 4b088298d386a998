//! The `extract(url, query)` operation: page cache, fetch, extraction
//! cache, agent.

use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FetchError, ResearchError, Result, ToolFailure};
use crate::traits::{fetcher::ContentFetcher, store::EvidenceStore};
use crate::types::{
    extraction::{AgentExtraction, ExtractOutcome, ExtractionRecord},
    page::{PageInput, PageRecord},
};

use super::agent::ExtractionAgent;

/// What one extract call produced, plus the failures it recovered from.
#[derive(Debug, Clone)]
pub struct ExtractReport {
    pub outcome: ExtractOutcome,
    pub failures: Vec<ToolFailure>,
}

/// Resolves a URL into grounded evidence for a query.
pub struct Extractor {
    store: Arc<dyn EvidenceStore>,
    fetcher: Arc<dyn ContentFetcher>,
    agent: ExtractionAgent,
}

impl Extractor {
    /// Create an extractor.
    pub fn new(
        store: Arc<dyn EvidenceStore>,
        fetcher: Arc<dyn ContentFetcher>,
        agent: ExtractionAgent,
    ) -> Self {
        Self {
            store,
            fetcher,
            agent,
        }
    }

    /// Extract evidence for `query` from `url`.
    ///
    /// Never fails for fetch, model or cache problems; those end up in the
    /// report. Only cancellation is an `Err`.
    pub async fn extract(
        &self,
        url: &str,
        query: &str,
        search_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ExtractReport> {
        let mut failures = Vec::new();

        let page = match self.load_page(url, query, search_id, cancel, &mut failures).await? {
            Ok(page) => page,
            Err(failure) => {
                let outcome = ExtractOutcome::failed(url, query, failure.to_string());
                failures.push(failure);
                return Ok(ExtractReport { outcome, failures });
            }
        };

        let (extraction, cached) = match self.cached_extraction(&page.page_id, query).await {
            Ok(Some(record)) => {
                debug!(url = %url, page_id = %page.page_id, "Extraction cache hit");
                (record.into_agent(), true)
            }
            Ok(None) => (self.run_agent(&page, query, cancel).await?, false),
            Err(e) => {
                warn!(url = %url, error = %e, "Extraction cache read failed");
                failures.push(ToolFailure::PersistenceReadFailure {
                    what: format!("extraction of {}", url),
                });
                (self.run_agent(&page, query, cancel).await?, false)
            }
        };
        let extraction = extraction.normalized();

        if extraction.broken {
            failures.push(ToolFailure::ContentUnavailable {
                url: url.to_string(),
                reason: extraction
                    .error
                    .clone()
                    .unwrap_or_else(|| "page content unavailable".to_string()),
            });
        } else if extraction.irrelevant {
            failures.push(ToolFailure::QueryIrrelevant {
                url: url.to_string(),
            });
        }

        info!(
            url = %url,
            cached,
            broken = extraction.broken,
            irrelevant = extraction.irrelevant,
            selections = extraction.selections.len(),
            "Extract complete"
        );

        Ok(ExtractReport {
            outcome: ExtractOutcome {
                url: url.to_string(),
                query: query.to_string(),
                title: page.title.clone(),
                page_id: Some(page.page_id.clone()),
                line_count: Some(page.line_count),
                viewpoint: extraction.viewpoint,
                broken: extraction.broken,
                irrelevant: extraction.irrelevant,
                selections: extraction.selections,
                error: extraction.error,
                cached,
            },
            failures,
        })
    }

    /// Cached page, or a fresh fetch that is then cached.
    ///
    /// The outer `Result` carries cancellation; the inner one a per-call
    /// failure.
    async fn load_page(
        &self,
        url: &str,
        query: &str,
        search_id: &str,
        cancel: &CancellationToken,
        failures: &mut Vec<ToolFailure>,
    ) -> Result<std::result::Result<PageRecord, ToolFailure>> {
        match self.store.find_cached_page_by_url(url).await {
            Ok(Some(page)) => {
                debug!(url = %url, page_id = %page.page_id, "Page cache hit");
                return Ok(Ok(page));
            }
            Ok(None) => debug!(url = %url, "Page cache miss"),
            Err(e) => {
                warn!(url = %url, error = %e, "Page cache read failed");
                failures.push(ToolFailure::PersistenceReadFailure {
                    what: format!("page {}", url),
                });
            }
        }

        let fetched = tokio::select! {
            _ = cancel.cancelled() => return Err(ResearchError::Cancelled),
            fetched = self.fetcher.fetch(url) => fetched,
        };
        let fetched = match fetched {
            Ok(page) => page,
            Err(FetchError::Empty { url }) => {
                return Ok(Err(ToolFailure::ContentUnavailable {
                    url,
                    reason: "no readable content".to_string(),
                }))
            }
            Err(e) => {
                warn!(url = %url, fetcher = self.fetcher.name(), error = %e, "Fetch failed");
                return Ok(Err(ToolFailure::FetchFailure {
                    url: url.to_string(),
                    reason: e.to_string(),
                }));
            }
        };

        if fetched.text.trim().is_empty() {
            return Ok(Err(ToolFailure::ContentUnavailable {
                url: url.to_string(),
                reason: "no readable content".to_string(),
            }));
        }

        let mut input = PageInput::new(url, fetched.text).for_search(search_id, query);
        if let Some(title) = fetched.title {
            input = input.with_title(title);
        }
        let record = input.clone().into_record(Utc::now());

        if let Err(e) = self.store.save_page(input).await {
            warn!(url = %url, error = %e, "Failed to cache page");
        }
        Ok(Ok(record))
    }

    async fn cached_extraction(&self, page_id: &str, query: &str) -> Result<Option<ExtractionRecord>> {
        self.store
            .find_cached_extraction_by_page_and_query(page_id, query)
            .await
    }

    async fn run_agent(
        &self,
        page: &PageRecord,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentExtraction> {
        let extraction = self.agent.extract(query, &page.lines(), cancel).await?;
        if !extraction.finalized {
            debug!(page_id = %page.page_id, "Extraction not finalized, skipping cache");
            return Ok(extraction);
        }

        let record = ExtractionRecord::from_agent(&page.page_id, query, extraction.clone());
        if let Err(e) = self.store.save_extraction(record).await {
            warn!(page_id = %page.page_id, error = %e, "Failed to cache extraction");
        }
        Ok(extraction)
    }
}
