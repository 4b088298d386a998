//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the research library
//! without making real model or network calls.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{FetchError, FetchResult, ResearchError, Result, SearchApiResult, SearchError};
use crate::traits::{
    fetcher::{ContentFetcher, FetchedPage},
    model::{ModelRequest, ModelTurn, ToolModel},
    searcher::{SearchHit, WebSearcher},
};
use crate::types::config::SearchDepth;
use crate::types::normalize::{normalize_text, normalize_url};

type Handler = Box<dyn Fn(&ModelRequest) -> Result<ModelTurn> + Send + Sync>;

/// A scripted tool-calling model.
///
/// Either answers through a handler closure (which can route on the
/// request's tools or history) or pops turns from a queue. With neither,
/// or once the queue is drained, it answers with plain text and no tool
/// calls.
#[derive(Default)]
pub struct MockToolModel {
    handler: Option<Handler>,
    queue: Arc<RwLock<VecDeque<ModelTurn>>>,
    calls: Arc<RwLock<Vec<ModelRequest>>>,
}

impl MockToolModel {
    /// Create a model with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request through `handler`.
    pub fn with_handler(
        mut self,
        handler: impl Fn(&ModelRequest) -> Result<ModelTurn> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Queue a turn to be returned in order.
    pub fn with_turn(self, turn: ModelTurn) -> Self {
        self.queue
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(turn);
        self
    }

    /// Queue several turns.
    pub fn with_turns(self, turns: impl IntoIterator<Item = ModelTurn>) -> Self {
        self.queue
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(turns);
        self
    }

    /// Get all requests made to this mock.
    pub fn calls(&self) -> Vec<ModelRequest> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests made so far.
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl ToolModel for MockToolModel {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelTurn> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(handler) = &self.handler {
            return handler(request);
        }

        Ok(self
            .queue
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| ModelTurn::text("nothing more to do")))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Mock web searcher for testing.
///
/// Results are keyed by normalized query. Unknown queries return no hits.
#[derive(Default)]
pub struct MockWebSearcher {
    results: RwLock<HashMap<String, Vec<SearchHit>>>,
    failures: RwLock<HashMap<String, u16>>,
    calls: RwLock<Vec<String>>,
}

impl MockWebSearcher {
    /// Create a new mock searcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add hits for a query.
    pub fn with_hits(self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.results
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize_text(query), hits);
        self
    }

    /// Add URL strings as hits.
    pub fn with_urls(self, query: &str, urls: &[&str]) -> Self {
        let hits = urls.iter().map(|u| SearchHit::new(*u)).collect();
        self.with_hits(query, hits)
    }

    /// Make a query fail with an HTTP status.
    pub fn fail_query(self, query: &str, status: u16) -> Self {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize_text(query), status);
        self
    }

    /// Queries searched so far, as received.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl WebSearcher for MockWebSearcher {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        _depth: Option<SearchDepth>,
    ) -> SearchApiResult<Vec<SearchHit>> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_string());

        let key = normalize_text(query);
        if let Some(status) = self
            .failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Err(SearchError::HttpStatus {
                status: *status,
                body: "mock failure".to_string(),
            });
        }

        let mut hits = self
            .results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .unwrap_or_default();
        hits.truncate(max_results);
        Ok(hits)
    }
}

/// Mock content fetcher for testing.
///
/// Pages are keyed by normalized URL. Unknown URLs answer HTTP 404.
#[derive(Default)]
pub struct MockFetcher {
    pages: RwLock<HashMap<String, FetchedPage>>,
    failures: RwLock<HashMap<String, String>>,
    calls: RwLock<Vec<String>>,
}

impl MockFetcher {
    /// Create a new mock fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page.
    pub fn with_page(self, url: &str, text: &str) -> Self {
        self.with_fetched(url, FetchedPage::new(text))
    }

    /// Add a page with title.
    pub fn with_fetched(self, url: &str, page: FetchedPage) -> Self {
        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize_url(url), page);
        self
    }

    /// Make a URL fail with a transport error.
    pub fn with_failure(self, url: &str, message: &str) -> Self {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize_url(url), message.to_string());
        self
    }

    /// URLs fetched so far, as received.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ContentFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<FetchedPage> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let key = normalize_url(url);
        if let Some(message) = self
            .failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Err(FetchError::Transport(message.clone()));
        }

        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or_else(|| FetchError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Model error helper for handler closures.
pub fn model_error(message: &str) -> ResearchError {
    ResearchError::Model(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_model_pops_queue_then_answers_text() {
        let model = MockToolModel::new().with_turn(ModelTurn::text("first"));
        let request = ModelRequest {
            system: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
        };

        assert_eq!(model.complete(&request).await.unwrap().content.as_deref(), Some("first"));
        assert!(model.complete(&request).await.unwrap().tool_calls.is_empty());
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_searcher_normalizes_queries() {
        let searcher = MockWebSearcher::new().with_urls("Rust Async", &["https://a", "https://b"]);
        let hits = searcher.search("  rust   async", 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(searcher.calls(), vec!["  rust   async"]);
    }

    #[tokio::test]
    async fn test_mock_fetcher_failure_and_missing() {
        let fetcher = MockFetcher::new().with_failure("https://down", "connection reset");
        assert!(matches!(
            fetcher.fetch("https://down").await,
            Err(FetchError::Transport(_))
        ));
        assert!(matches!(
            fetcher.fetch("https://missing").await,
            Err(FetchError::HttpStatus { status: 404, .. })
        ));
    }
}
