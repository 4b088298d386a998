//! Evidence-Grounded Web Research Library
//!
//! Answers a natural-language query with web evidence that can be cited
//! down to exact line ranges of fetched pages.
//!
//! # Design Philosophy
//!
//! **"Nothing reaches the user that extraction did not see"**
//!
//! - A model plans searches and extracts under hard call budgets
//! - Each page is read by a bounded extraction agent over numbered lines
//! - Final claims are intersected with extracted ranges; the rest is dropped
//! - Library handles mechanics, the caller handles the answer
//!
//! # Usage
//!
//! ```rust,ignore
//! use research::{ResearchPipeline, MemoryStore};
//! use research::testing::{MockFetcher, MockToolModel, MockWebSearcher};
//!
//! let pipeline = ResearchPipeline::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MockWebSearcher::new()),
//!     Arc::new(MockFetcher::new()),
//!     Arc::new(MockToolModel::new()),
//! );
//!
//! let outcome = pipeline.run("does tokio use work stealing?", &cancel).await?;
//! let answer = pipeline.link_citations("Yes [1].", &outcome.references);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Seams to the outside world (ToolModel, WebSearcher, ContentFetcher, EvidenceStore)
//! - [`types`] - Selections, results, references, sessions and configuration
//! - [`pipeline`] - Orchestrator, extraction agent, validator, dedupe, references, citations
//! - [`stores`] - Storage implementations (MemoryStore, FileStore)
//! - [`security`] - Credential handling and SSRF protection
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod pipeline;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use error::{
    DropReason, FetchError, ResearchError, Result, SearchError, SecurityError, ToolFailure,
    ToolKind,
};
pub use traits::{
    fetcher::{ContentFetcher, FetchedPage, RateLimitedFetcher, ReaderFetcher, ValidatedFetcher},
    model::{ChatMessage, ModelRequest, ModelTurn, ToolCall, ToolDefinition, ToolModel},
    searcher::{SearchHit, TavilyWebSearcher, WebSearcher},
    store::EvidenceStore,
};
pub use types::{
    config::{
        CitationConfig, ExtractAgentConfig, OrchestratorConfig, ReferenceConfig, ResearchConfig,
        SearchDepth,
    },
    extraction::{AgentExtraction, ExtractOutcome, ExtractionRecord},
    page::{PageInput, PageRecord},
    reference::{Reference, ReferenceUri},
    result::SearchResult,
    selection::{LineRange, LineSelection},
    session::SearchSession,
};

// Re-export the pipeline entry point and its pieces
pub use pipeline::{
    build_references, dedupe_results, link_citations, validate_results, EventKind, EventLog,
    ResearchEvent, ResearchOutcome, ResearchPipeline,
};

// Re-export stores
pub use stores::{FileStore, MemoryStore};

#[cfg(feature = "openai")]
pub use ai::OpenAiToolModel;
