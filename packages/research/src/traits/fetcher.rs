//! Content fetcher trait and implementations.
//!
//! Provides:
//! - `ReaderFetcher` - HTTP reader endpoint that turns a URL into readable text
//! - `ValidatedFetcher` - Wrapper that validates URLs for SSRF safety
//! - `RateLimitedFetcher` - Wrapper that enforces a request quota

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};
use crate::security::{SecretString, UrlValidator};

/// Readable text resolved from a URL.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub text: String,
    pub title: Option<String>,
}

impl FetchedPage {
    /// Create a page from text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            title: None,
        }
    }

    /// Add a title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Resolves a URL into readable text.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch readable text for a URL.
    async fn fetch(&self, url: &str) -> FetchResult<FetchedPage>;

    /// Name for logging.
    fn name(&self) -> &str {
        "fetcher"
    }
}

/// Fetcher backed by a reader endpoint (`<endpoint><url>`).
///
/// Reader services answer either with the page as bare text or with a
/// JSON object carrying `content` (optionally nested under `data`).
pub struct ReaderFetcher {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl Default for ReaderFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderFetcher {
    /// Create a fetcher using the public reader endpoint.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(45))
                .build()
                .unwrap_or_default(),
            endpoint: "https://r.jina.ai/".to_string(),
            api_key: None,
        }
    }

    /// Set the reader endpoint prefix.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the reader API key.
    pub fn with_api_key(mut self, api_key: impl Into<SecretString>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

/// Parse a reader response body.
///
/// Bare text is returned as-is. A JSON object must carry a non-empty
/// `content` (or `data.content`); a JSON object without one is treated
/// as empty.
pub fn parse_reader_body(url: &str, body: &str) -> FetchResult<FetchedPage> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(FetchError::Empty {
            url: url.to_string(),
        });
    }

    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            let field = |name: &str| {
                value
                    .get(name)
                    .or_else(|| value.get("data").and_then(|d| d.get(name)))
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };

            return match field("content") {
                Some(content) => Ok(FetchedPage {
                    text: content,
                    title: field("title"),
                }),
                None => Err(FetchError::Empty {
                    url: url.to_string(),
                }),
            };
        }
    }

    Ok(FetchedPage::new(trimmed))
}

#[async_trait]
impl ContentFetcher for ReaderFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<FetchedPage> {
        debug!(url = %url, "Reader fetch starting");

        let mut request = self
            .client
            .get(format!("{}{}", self.endpoint, url))
            .header("Accept", "application/json, text/plain;q=0.9");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key.expose()));
        }

        let response = request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Reader request failed");
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let page = parse_reader_body(url, &body)?;
        debug!(url = %url, chars = page.text.len(), "Reader fetch complete");
        Ok(page)
    }

    fn name(&self) -> &str {
        "reader"
    }
}

/// A fetcher that validates URLs before fetching.
pub struct ValidatedFetcher<F: ContentFetcher> {
    inner: F,
    validator: UrlValidator,
    resolve_dns: bool,
}

impl<F: ContentFetcher> ValidatedFetcher<F> {
    /// Wrap a fetcher with the default validator.
    pub fn new(inner: F) -> Self {
        Self::with_validator(inner, UrlValidator::new())
    }

    /// Wrap a fetcher with a custom validator.
    pub fn with_validator(inner: F, validator: UrlValidator) -> Self {
        Self {
            inner,
            validator,
            resolve_dns: false,
        }
    }

    /// Also resolve DNS and reject names pointing at internal IPs.
    pub fn resolve_dns(mut self, enabled: bool) -> Self {
        self.resolve_dns = enabled;
        self
    }
}

#[async_trait]
impl<F: ContentFetcher> ContentFetcher for ValidatedFetcher<F> {
    async fn fetch(&self, url: &str) -> FetchResult<FetchedPage> {
        if self.resolve_dns {
            self.validator.validate_with_dns(url).await?;
        } else {
            self.validator.validate(url)?;
        }
        self.inner.fetch(url).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A fetcher wrapper that enforces a request quota.
pub struct RateLimitedFetcher<F: ContentFetcher> {
    inner: F,
    limiter: Arc<DefaultRateLimiter>,
}

impl<F: ContentFetcher> RateLimitedFetcher<F> {
    /// Limit to `requests_per_second` (zero is treated as one).
    pub fn new(inner: F, requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(nonzero_ext::nonzero!(1u32));
        Self::with_quota(inner, Quota::per_second(rate))
    }

    /// Create with a custom quota.
    pub fn with_quota(inner: F, quota: Quota) -> Self {
        Self {
            inner,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

#[async_trait]
impl<F: ContentFetcher> ContentFetcher for RateLimitedFetcher<F> {
    async fn fetch(&self, url: &str) -> FetchResult<FetchedPage> {
        self.limiter.until_ready().await;
        self.inner.fetch(url).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFetcher;

    #[test]
    fn test_parse_bare_text() {
        let page = parse_reader_body("https://a", "  # Title\nBody text\n").unwrap();
        assert_eq!(page.text, "# Title\nBody text");
        assert_eq!(page.title, None);
    }

    #[test]
    fn test_parse_json_content() {
        let page = parse_reader_body("https://a", r#"{"content":"hello","title":"T"}"#).unwrap();
        assert_eq!(page.text, "hello");
        assert_eq!(page.title.as_deref(), Some("T"));
    }

    #[test]
    fn test_parse_json_nested_under_data() {
        let body = r#"{"code":200,"data":{"title":"Docs","content":"line one\nline two"}}"#;
        let page = parse_reader_body("https://a", body).unwrap();
        assert_eq!(page.text, "line one\nline two");
        assert_eq!(page.title.as_deref(), Some("Docs"));
    }

    #[test]
    fn test_parse_json_without_content_is_empty() {
        let err = parse_reader_body("https://a", r#"{"code":451,"message":"blocked"}"#).unwrap_err();
        assert!(matches!(err, FetchError::Empty { .. }));
    }

    #[test]
    fn test_parse_brace_prefixed_text_falls_back_to_raw() {
        let page = parse_reader_body("https://a", "{not json} but text").unwrap();
        assert_eq!(page.text, "{not json} but text");
    }

    #[tokio::test]
    async fn test_validated_fetcher_blocks_before_inner_call() {
        let inner = MockFetcher::new().with_page("http://127.0.0.1/admin", "secret");
        let fetcher = ValidatedFetcher::new(inner);

        let err = fetcher.fetch("http://127.0.0.1/admin").await.unwrap_err();
        assert!(matches!(err, FetchError::Security(_)));
    }

    #[tokio::test]
    async fn test_rate_limited_fetcher_passes_through() {
        let inner = MockFetcher::new().with_page("https://a.example", "text");
        let fetcher = RateLimitedFetcher::new(inner, 50);
        assert_eq!(fetcher.fetch("https://a.example").await.unwrap().text, "text");
    }
}
