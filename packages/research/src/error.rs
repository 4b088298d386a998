//! Typed errors for the research library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! Two layers exist:
//! - Adapter errors (`SearchError`, `FetchError`, `SecurityError`) describe
//!   what went wrong talking to the outside world.
//! - `ToolFailure` is the per-call failure taxonomy the orchestrator records.
//!   Its `Display` output is what callers see in the run's error list.
//!
//! Only `ResearchError` ever leaves the pipeline as an `Err`.

use thiserror::Error;

/// Errors that abort a research operation.
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Empty or unusable query
    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Model call failed
    #[error("model error: {0}")]
    Model(String),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Reference URI could not be parsed
    #[error("invalid reference URI: {uri}")]
    InvalidReferenceUri { uri: String },

    /// Reference URI belongs to another project
    #[error("reference belongs to project {found}, current project is {expected}")]
    ProjectMismatch { expected: String, found: String },

    /// Reference does not exist in the persisted session
    #[error("reference not found: {uri}")]
    ReferenceNotFound { uri: String },
}

impl ResearchError {
    /// Wrap an I/O error as a storage failure.
    pub fn storage(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(e))
    }
}

/// Structured failures from the web search adapter.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Request never produced a response
    #[error("search transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status
    #[error("search API returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Response body did not match the expected shape
    #[error("search response schema mismatch: {0}")]
    Schema(String),

    /// Provider returned no usable results
    #[error("search returned no results for: {query}")]
    Empty { query: String },

    /// Call was cancelled while in flight
    #[error("search cancelled")]
    Cancelled,
}

/// Failures from the content fetch adapter.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Security validation failed
    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    /// Request never produced a response
    #[error("fetch transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// The body contained no readable text
    #[error("no readable content at {url}")]
    Empty { url: String },

    /// Connection timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Call was cancelled while in flight
    #[error("fetch cancelled")]
    Cancelled,
}

/// Security-related errors, primarily for SSRF protection.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// URL scheme not allowed (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// Host is blocked (e.g., localhost, internal IPs)
    #[error("blocked host: {0}")]
    BlockedHost(String),

    /// IP in blocked CIDR range (e.g., 10.0.0.0/8)
    #[error("blocked IP range: {0}")]
    BlockedCidr(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// DNS resolution failed
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Which tool a guard or failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Search,
    Extract,
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolKind::Search => f.write_str("search"),
            ToolKind::Extract => f.write_str("extract"),
        }
    }
}

/// Why the validator dropped or trimmed a claimed result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// No prior extraction exists for the URL
    UnknownUrl,
    /// None of the claimed ranges intersect extracted evidence
    NoOverlap,
    /// Item is neither flagged nor carries any selection
    NoSelections,
    /// Item kept, but clipped to the overlapping ranges
    Clipped { kept: String },
}

/// Per-call failures recovered into the run's error log.
///
/// None of these abort a run. The orchestrator stores their `Display`
/// rendering so the caller can surface them verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolFailure {
    #[error("{tool} budget exceeded: call {attempt} exceeds the limit of {limit}")]
    ToolBudgetExceeded {
        tool: ToolKind,
        attempt: usize,
        limit: usize,
    },

    #[error("{tool} call blocked: \"{key}\" already requested {count} time(s) (limit {limit})")]
    RepeatedCallBlocked {
        tool: ToolKind,
        key: String,
        count: usize,
        limit: usize,
    },

    #[error("fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("content unavailable at {url}: {reason}")]
    ContentUnavailable { url: String, reason: String },

    #[error("{url} judged irrelevant to the query")]
    QueryIrrelevant { url: String },

    #[error("{}", render_drop(.url, .reason))]
    ValidationDropped { url: String, reason: DropReason },

    #[error("finalize was never called; rebuilt {recovered} result(s) from extraction history")]
    FinalizeMissing { recovered: usize },

    #[error("cache read failed for {what}; treated as a miss")]
    PersistenceReadFailure { what: String },
}

fn render_drop(url: &str, reason: &DropReason) -> String {
    match reason {
        DropReason::UnknownUrl => format!("dropped {url}: no extraction was performed for this URL"),
        DropReason::NoOverlap => {
            format!("dropped {url}: claimed lines do not overlap any extracted selection")
        }
        DropReason::NoSelections => format!("dropped {url}: no selections and no status flag"),
        DropReason::Clipped { kept } => {
            format!("clipped {url}: claimed lines only partially matched; kept {kept}")
        }
    }
}

/// Result type alias for research operations.
pub type Result<T> = std::result::Result<T, ResearchError>;

/// Result type alias for search adapter calls.
pub type SearchApiResult<T> = std::result::Result<T, SearchError>;

/// Result type alias for fetch adapter calls.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for security operations.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;
