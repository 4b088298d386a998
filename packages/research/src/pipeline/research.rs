//! The research pipeline - main entry point of the library.
//!
//! `ResearchPipeline` wires the adapters together for one project:
//! orchestrated search and extraction, then deduplication, reference
//! numbering and session persistence. Persisted references can later be
//! resolved from their `evidence://` URI.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ResearchError, Result};
use crate::traits::{
    fetcher::ContentFetcher,
    model::ToolModel,
    searcher::WebSearcher,
    store::{new_search_id, EvidenceStore},
};
use crate::types::{
    config::ResearchConfig,
    reference::{Reference, ReferenceUri},
    result::SearchResult,
    session::{FinalizeSearchInput, SearchSession, SessionHandle},
};

use super::agent::ExtractionAgent;
use super::citations;
use super::dedupe::dedupe_results;
use super::events::{EventLog, ResearchEvent};
use super::extractor::Extractor;
use super::orchestrator::SearchOrchestrator;
use super::references::build_references;

/// Everything one research run produced.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub query: String,

    /// Deduplicated results, or error-only rows when `fatal`
    pub sources: Vec<SearchResult>,
    pub references: Vec<Reference>,
    pub search_id: String,
    pub project_id: String,
    pub created_at: DateTime<Utc>,

    /// Human-readable partial failures, in the order they happened
    pub errors: Vec<String>,
    pub fatal: bool,
    pub events: Vec<ResearchEvent>,
}

/// Evidence-grounded web research over one project store.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = ResearchPipeline::new(store, searcher, fetcher, model);
/// let outcome = pipeline.run("is tokio work-stealing?", &CancellationToken::new()).await?;
///
/// for reference in &outcome.references {
///     println!("[{}] {}", reference.ref_id, reference.uri);
/// }
/// ```
pub struct ResearchPipeline {
    store: Arc<dyn EvidenceStore>,
    searcher: Arc<dyn WebSearcher>,
    fetcher: Arc<dyn ContentFetcher>,
    model: Arc<dyn ToolModel>,
    extract_model: Option<Arc<dyn ToolModel>>,
    config: ResearchConfig,
    progress: Option<UnboundedSender<ResearchEvent>>,
}

impl ResearchPipeline {
    /// Create a pipeline with default configuration.
    pub fn new(
        store: Arc<dyn EvidenceStore>,
        searcher: Arc<dyn WebSearcher>,
        fetcher: Arc<dyn ContentFetcher>,
        model: Arc<dyn ToolModel>,
    ) -> Self {
        Self {
            store,
            searcher,
            fetcher,
            model,
            extract_model: None,
            config: ResearchConfig::default(),
            progress: None,
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ResearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a separate model for per-page extraction.
    pub fn with_extract_model(mut self, model: Arc<dyn ToolModel>) -> Self {
        self.extract_model = Some(model);
        self
    }

    /// Stream events to `sender` while runs are in progress.
    pub fn with_progress(mut self, sender: UnboundedSender<ResearchEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Id of the project the store serves.
    pub fn project_id(&self) -> &str {
        self.store.project_id()
    }

    /// Research `query` and persist the resulting references.
    ///
    /// Search, fetch, model and persistence problems are reported in
    /// `errors`. Returns `Err` only for an empty query or cancellation.
    pub async fn run(&self, query: &str, cancel: &CancellationToken) -> Result<ResearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResearchError::InvalidQuery {
                reason: "query is empty".to_string(),
            });
        }
        if cancel.is_cancelled() {
            return Err(ResearchError::Cancelled);
        }

        let mut errors = Vec::new();
        let session = match self.store.create_search_session(query).await {
            Ok(session) => session,
            Err(e) => {
                warn!(query = %query, error = %e, "Could not create search session");
                errors.push(format!("failed to create search session: {}", e));
                SessionHandle {
                    search_id: new_search_id(),
                    created_at: Utc::now(),
                }
            }
        };
        info!(query = %query, search_id = %session.search_id, "Research started");

        let events = match &self.progress {
            Some(sender) => EventLog::with_subscriber(sender.clone()),
            None => EventLog::new(),
        };

        let output = self
            .orchestrator()
            .run(query, &session.search_id, &events, cancel)
            .await?;
        errors.extend(output.errors);

        let (sources, references) = if output.fatal {
            (output.results, Vec::new())
        } else {
            let sources = dedupe_results(output.results);
            let references = build_references(
                &sources,
                self.store.project_id(),
                &session.search_id,
                &self.config.references,
            );
            (sources, references)
        };

        let input = FinalizeSearchInput {
            search_id: session.search_id.clone(),
            query: query.to_string(),
            created_at: session.created_at,
            prompt: None,
            conclusion: None,
            references: references.clone(),
        };
        if let Err(e) = self.store.finalize_search(input).await {
            warn!(search_id = %session.search_id, error = %e, "Could not persist search session");
            errors.push(format!("failed to persist search session {}: {}", session.search_id, e));
        }

        info!(
            query = %query,
            search_id = %session.search_id,
            sources = sources.len(),
            references = references.len(),
            errors = errors.len(),
            fatal = output.fatal,
            "Research complete"
        );

        Ok(ResearchOutcome {
            query: query.to_string(),
            sources,
            references,
            search_id: session.search_id,
            project_id: self.store.project_id().to_string(),
            created_at: session.created_at,
            errors,
            fatal: output.fatal,
            events: events.snapshot(),
        })
    }

    /// Record the prompt and answer generated from a run's references.
    pub async fn save_answer(
        &self,
        outcome: &ResearchOutcome,
        prompt: Option<String>,
        conclusion: Option<String>,
    ) -> Result<()> {
        self.store
            .finalize_search(FinalizeSearchInput {
                search_id: outcome.search_id.clone(),
                query: outcome.query.clone(),
                created_at: outcome.created_at,
                prompt,
                conclusion,
                references: outcome.references.clone(),
            })
            .await
    }

    /// Look up a persisted reference by its URI.
    pub async fn resolve_reference(&self, uri: &str) -> Result<Reference> {
        let parsed = ReferenceUri::parse(uri)?;
        let project_id = self.store.project_id();
        if parsed.project_id != project_id {
            return Err(ResearchError::ProjectMismatch {
                expected: project_id.to_string(),
                found: parsed.project_id,
            });
        }

        let not_found = || ResearchError::ReferenceNotFound {
            uri: uri.trim().to_string(),
        };
        let session = self
            .store
            .load_search_session(&parsed.search_id)
            .await?
            .ok_or_else(not_found)?;
        session.reference(parsed.ref_id).cloned().ok_or_else(not_found)
    }

    /// Load a persisted session.
    pub async fn load_session(&self, search_id: &str) -> Result<Option<SearchSession>> {
        self.store.load_search_session(search_id).await
    }

    /// Rewrite citation markers in `text` into links to `references`.
    pub fn link_citations(&self, text: &str, references: &[Reference]) -> String {
        citations::link_citations(text, references, &self.config.citations)
    }

    fn orchestrator(&self) -> SearchOrchestrator {
        let extract_model = self
            .extract_model
            .clone()
            .unwrap_or_else(|| self.model.clone());
        let agent = ExtractionAgent::new(extract_model, self.config.extract.clone());
        let extractor = Arc::new(Extractor::new(self.store.clone(), self.fetcher.clone(), agent));
        SearchOrchestrator::new(
            self.model.clone(),
            self.searcher.clone(),
            extractor,
            self.config.orchestrator.clone(),
        )
    }
}
