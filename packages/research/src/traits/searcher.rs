//! Web searcher trait and the Tavily implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{SearchApiResult, SearchError};
use crate::security::SecretString;
use crate::types::config::SearchDepth;

/// A candidate page returned by a search provider.
///
/// Every field is optional because providers are not consistent; rows
/// without a URL are dropped by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: Option<String>,
    pub url: Option<String>,
    pub content: Option<String>,
}

impl SearchHit {
    /// Create a hit from a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Add a title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add a content snippet.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Web search trait for open-world discovery.
///
/// Implementations must report HTTP failures, schema mismatches and empty
/// result sets as distinct `SearchError` variants.
#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Search the web, returning ranked candidates.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        depth: Option<SearchDepth>,
    ) -> SearchApiResult<Vec<SearchHit>>;
}

/// Tavily-backed web searcher.
pub struct TavilyWebSearcher {
    api_key: SecretString,
    client: reqwest::Client,
    endpoint: String,
}

impl TavilyWebSearcher {
    /// Create a new Tavily web searcher.
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            endpoint: "https://api.tavily.com/search".to_string(),
        }
    }

    /// Point at a different endpoint (proxies, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Use a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: &'static str,
    max_results: usize,
}

#[derive(Deserialize)]
struct TavilyResponse {
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: Option<String>,
    title: Option<String>,
    content: Option<String>,
}

/// Parse a Tavily response body into hits.
///
/// Split out from the HTTP call so the schema handling is testable.
pub(crate) fn parse_tavily_body(query: &str, body: &str) -> SearchApiResult<Vec<SearchHit>> {
    let response: TavilyResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Schema(e.to_string()))?;

    let hits: Vec<SearchHit> = response
        .results
        .into_iter()
        .filter(|r| r.url.as_deref().is_some_and(|u| !u.trim().is_empty()))
        .map(|r| SearchHit {
            title: r.title,
            url: r.url,
            content: r.content,
        })
        .collect();

    if hits.is_empty() {
        return Err(SearchError::Empty {
            query: query.to_string(),
        });
    }
    Ok(hits)
}

#[async_trait]
impl WebSearcher for TavilyWebSearcher {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        depth: Option<SearchDepth>,
    ) -> SearchApiResult<Vec<SearchHit>> {
        let request = TavilyRequest {
            query,
            search_depth: depth.unwrap_or_default().as_str(),
            max_results,
        };

        debug!(query = %query, max_results, "Tavily search starting");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        if !status.is_success() {
            warn!(query = %query, status = status.as_u16(), "Tavily API error");
            return Err(SearchError::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let hits = parse_tavily_body(query, &body)?;
        debug!(query = %query, hits = hits.len(), "Tavily search complete");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tavily_body() {
        let body = r#"{"results":[
            {"url":"https://a.example","title":"A","content":"alpha","score":0.9},
            {"url":"","title":"blank"},
            {"title":"no url"}
        ]}"#;
        let hits = parse_tavily_body("q", body).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url.as_deref(), Some("https://a.example"));
        assert_eq!(hits[0].content.as_deref(), Some("alpha"));
    }

    #[test]
    fn test_parse_tavily_schema_mismatch() {
        let err = parse_tavily_body("q", r#"{"answer":"no results key"}"#).unwrap_err();
        assert!(matches!(err, SearchError::Schema(_)));
    }

    #[test]
    fn test_parse_tavily_empty() {
        let err = parse_tavily_body("rust", r#"{"results":[]}"#).unwrap_err();
        assert!(matches!(err, SearchError::Empty { query } if query == "rust"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_tavily_live_search() {
        let api_key = std::env::var("TAVILY_API_KEY").expect("TAVILY_API_KEY required");
        let searcher = TavilyWebSearcher::new(api_key);
        let hits = searcher
            .search("rust async runtime", 3, None)
            .await
            .unwrap();
        assert!(!hits.is_empty());
    }
}
