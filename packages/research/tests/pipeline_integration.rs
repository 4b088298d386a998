//! End-to-end runs of the research pipeline over mock adapters.

use async_trait::async_trait;
use mockall::mock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use research::error::SearchApiResult;
use research::testing::{MockFetcher, MockToolModel, MockWebSearcher};
use research::types::extraction::ExtractionRecord;
use research::types::page::{PageInput, PageRecord, SavedPage};
use research::types::session::{FinalizeSearchInput, SessionHandle};
use research::{
    EventKind, EvidenceStore, FileStore, MemoryStore, ModelRequest, ModelTurn, ResearchConfig,
    ResearchError, ResearchPipeline, SearchDepth, SearchHit, ToolCall, WebSearcher,
};

mock! {
    pub Searcher {}

    #[async_trait]
    impl WebSearcher for Searcher {
        async fn search(
            &self,
            query: &str,
            max_results: usize,
            depth: Option<SearchDepth>,
        ) -> SearchApiResult<Vec<SearchHit>>;
    }
}

const PAGE_A: &str = "alpha 1\nalpha 2\nalpha 3\nalpha 4\nalpha 5\nalpha 6\nalpha 7\nalpha 8";

fn is_orchestrator(request: &ModelRequest) -> bool {
    request.tools.iter().any(|t| t.name == "finalize")
}

fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall::with_json(id, name, args)
}

/// Extraction side of the scripted model: page A supports the query on
/// lines 3-5, anything else is irrelevant.
fn extract_turn(request: &ModelRequest) -> ModelTurn {
    let task = request.first_user_message().unwrap_or_default();
    let args = if task.contains("alpha") {
        serde_json::json!({
            "viewpoint": "A says X is true",
            "selections": [{"start": 3, "end": 5}]
        })
    } else {
        serde_json::json!({"viewpoint": "off topic", "irrelevant": true})
    };
    ModelTurn::calls(vec![call("w", "write_extract_result", args)])
}

/// Orchestrator: search, extract both hits, then finalize with the given
/// payload.
fn scripted_model(finalize: Option<serde_json::Value>) -> MockToolModel {
    MockToolModel::new().with_handler(move |request| {
        if !is_orchestrator(request) {
            return Ok(extract_turn(request));
        }
        Ok(match request.tool_result_count() {
            0 => ModelTurn::calls(vec![call("s1", "search", serde_json::json!({"query": "X"}))]),
            1 => ModelTurn::calls(vec![
                call("e1", "extract", serde_json::json!({"url": "https://a.example/post"})),
                call("e2", "extract", serde_json::json!({"url": "https://b.example/"})),
            ]),
            _ => match &finalize {
                Some(payload) => ModelTurn::calls(vec![call("f", "finalize", payload.clone())]),
                None => ModelTurn::text("I have enough."),
            },
        })
    })
}

fn searcher() -> MockWebSearcher {
    MockWebSearcher::new().with_urls("X", &["https://a.example/post", "https://b.example/"])
}

fn fetcher() -> MockFetcher {
    MockFetcher::new()
        .with_page("https://a.example/post", PAGE_A)
        .with_failure("https://b.example/", "connection reset")
}

fn claims() -> serde_json::Value {
    serde_json::json!({
        "results": [
            {"url": "https://a.example/post", "viewpoint": "A says X is true",
             "selections": [{"start": 2, "end": 4}]},
            {"url": "https://b.example/", "viewpoint": "B is unreachable", "broken": true}
        ]
    })
}

fn pipeline(store: Arc<dyn EvidenceStore>, model: MockToolModel) -> ResearchPipeline {
    ResearchPipeline::new(store, Arc::new(searcher()), Arc::new(fetcher()), Arc::new(model))
}

#[tokio::test]
async fn test_end_to_end_two_rows_one_reference() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store.clone(), scripted_model(Some(claims())));

    let outcome = pipeline.run("X", &CancellationToken::new()).await.unwrap();

    assert!(!outcome.fatal);
    assert_eq!(outcome.sources.len(), 2);

    let a = &outcome.sources[0];
    assert_eq!(a.url, "https://a.example/post");
    assert_eq!(a.selections.len(), 1);
    assert_eq!((a.selections[0].start, a.selections[0].end), (3, 4));
    assert_eq!(a.selections[0].text, "alpha 3\nalpha 4");

    let b = &outcome.sources[1];
    assert!(b.broken);
    assert!(b.selections.is_empty());

    assert_eq!(outcome.references.len(), 1);
    let reference = &outcome.references[0];
    assert_eq!(reference.ref_id, 1);
    assert_eq!(
        reference.uri,
        format!("evidence://{}/{}/1", outcome.project_id, outcome.search_id)
    );

    // Claimed 2-4 against extracted 3-5: kept, but clipped.
    assert!(outcome.errors.iter().any(|e| e.starts_with("clipped https://a.example/post")));
    assert!(outcome.errors.iter().any(|e| e.contains("connection reset")));

    let session = store.load_search_session(&outcome.search_id).await.unwrap().unwrap();
    assert_eq!(session.references, outcome.references);
}

#[tokio::test]
async fn test_event_indices_are_monotonic() {
    let pipeline = pipeline(Arc::new(MemoryStore::new()), scripted_model(Some(claims())));
    let outcome = pipeline.run("X", &CancellationToken::new()).await.unwrap();

    let indices: Vec<u64> = outcome.events.iter().map(|e| e.index).collect();
    assert!(indices.windows(2).all(|w| w[0] < w[1]));
    assert!(outcome
        .events
        .iter()
        .any(|e| matches!(e.kind, EventKind::Finalized { results: 2 })));
}

#[tokio::test]
async fn test_missing_finalize_falls_back_to_extract_history() {
    let pipeline = pipeline(Arc::new(MemoryStore::new()), scripted_model(None));
    let outcome = pipeline.run("X", &CancellationToken::new()).await.unwrap();

    assert!(!outcome.fatal);
    assert_eq!(outcome.references.len(), 1);
    assert_eq!(outcome.references[0].text, "alpha 3\nalpha 4\nalpha 5");
    assert!(outcome.errors.iter().any(|e| e.starts_with("finalize was never called")));
    assert!(outcome
        .events
        .iter()
        .any(|e| matches!(e.kind, EventKind::FallbackUsed { recovered: 2 })));
}

#[tokio::test]
async fn test_search_budget_never_reaches_searcher() {
    let mut searcher = MockSearcher::new();
    searcher
        .expect_search()
        .withf(|query, _, _| query.to_string() == "first")
        .times(1)
        .returning(|_, _, _| Ok(vec![SearchHit::new("https://a.example/post")]));

    let model = MockToolModel::new().with_handler(|request| {
        Ok(match request.tool_result_count() {
            0 => ModelTurn::calls(vec![
                call("1", "search", serde_json::json!({"query": "first"})),
                call("2", "search", serde_json::json!({"query": "second"})),
            ]),
            _ => ModelTurn::calls(vec![call("3", "finalize", serde_json::json!({}))]),
        })
    });

    let config = ResearchConfig::default().with_max_search_calls(1);
    let pipeline = ResearchPipeline::new(
        Arc::new(MemoryStore::new()),
        Arc::new(searcher),
        Arc::new(MockFetcher::new()),
        Arc::new(model),
    )
    .with_config(config);

    let outcome = pipeline.run("X", &CancellationToken::new()).await.unwrap();
    assert!(outcome
        .errors
        .iter()
        .any(|e| e.starts_with("search budget exceeded")));
}

#[tokio::test]
async fn test_every_extract_failing_is_fatal() {
    let model = MockToolModel::new().with_handler(|request| {
        Ok(match request.tool_result_count() {
            0 => ModelTurn::calls(vec![call(
                "1",
                "extract",
                serde_json::json!({"url": "https://b.example/"}),
            )]),
            _ => ModelTurn::calls(vec![call("2", "finalize", serde_json::json!({}))]),
        })
    });
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store.clone(), model);

    let outcome = pipeline.run("X", &CancellationToken::new()).await.unwrap();

    assert!(outcome.fatal);
    assert!(outcome.references.is_empty());
    assert!(outcome
        .sources
        .iter()
        .all(|s| s.url.starts_with("search://subagent-error/") && s.error.is_some()));

    let session = store.load_search_session(&outcome.search_id).await.unwrap().unwrap();
    assert!(session.references.is_empty());
}

#[tokio::test]
async fn test_extractions_are_cached_across_runs() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(fetcher());
    let model = Arc::new(scripted_model(Some(claims())));
    let pipeline = ResearchPipeline::new(store.clone(), Arc::new(searcher()), fetcher.clone(), model.clone());

    pipeline.run("X", &CancellationToken::new()).await.unwrap();
    let calls_after_first = model.call_count();
    let second = pipeline.run("X", &CancellationToken::new()).await.unwrap();

    // Page A is served from the cache; B is fetched again because it failed.
    let a_fetches = fetcher.calls().iter().filter(|u| u.contains("a.example")).count();
    assert_eq!(a_fetches, 1);
    assert_eq!(second.references.len(), 1);
    // Second run only spends orchestrator turns: search, extract, finalize.
    assert_eq!(model.call_count() - calls_after_first, 3);
}

#[tokio::test]
async fn test_cancelled_run_returns_cancelled() {
    let pipeline = pipeline(Arc::new(MemoryStore::new()), scripted_model(Some(claims())));
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(matches!(
        pipeline.run("X", &cancel).await,
        Err(ResearchError::Cancelled)
    ));
}

/// Store whose session writes always fail.
struct ReadOnlySessions(MemoryStore);

#[async_trait]
impl EvidenceStore for ReadOnlySessions {
    fn project_id(&self) -> &str {
        self.0.project_id()
    }

    async fn create_search_session(&self, query: &str) -> research::Result<SessionHandle> {
        self.0.create_search_session(query).await
    }

    async fn find_cached_page_by_url(&self, url: &str) -> research::Result<Option<PageRecord>> {
        self.0.find_cached_page_by_url(url).await
    }

    async fn find_cached_extraction_by_page_and_query(
        &self,
        page_id: &str,
        query: &str,
    ) -> research::Result<Option<ExtractionRecord>> {
        self.0.find_cached_extraction_by_page_and_query(page_id, query).await
    }

    async fn save_page(&self, input: PageInput) -> research::Result<SavedPage> {
        self.0.save_page(input).await
    }

    async fn save_extraction(&self, record: ExtractionRecord) -> research::Result<()> {
        self.0.save_extraction(record).await
    }

    async fn finalize_search(&self, _input: FinalizeSearchInput) -> research::Result<()> {
        Err(ResearchError::storage(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        )))
    }

    async fn load_search_session(
        &self,
        search_id: &str,
    ) -> research::Result<Option<research::SearchSession>> {
        self.0.load_search_session(search_id).await
    }
}

#[tokio::test]
async fn test_persistence_failure_is_reported_not_fatal() {
    let store = Arc::new(ReadOnlySessions(MemoryStore::new()));
    let pipeline = pipeline(store, scripted_model(Some(claims())));

    let outcome = pipeline.run("X", &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.references.len(), 1);
    assert!(outcome
        .errors
        .iter()
        .any(|e| e.starts_with("failed to persist search session")));
}

#[tokio::test]
async fn test_file_store_references_resolve_and_link() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let pipeline = pipeline(store, scripted_model(Some(claims())));
    let outcome = pipeline.run("X", &CancellationToken::new()).await.unwrap();
    let uri = outcome.references[0].uri.clone();

    // A fresh store over the same directory sees the persisted session.
    let reopened = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let pipeline = pipeline_for(reopened);
    let reference = pipeline.resolve_reference(&uri).await.unwrap();
    assert_eq!(reference.text, "alpha 3\nalpha 4");
    assert_eq!(reference.url, "https://a.example/post");

    let session = pipeline.load_session(&outcome.search_id).await.unwrap().unwrap();
    let linked = pipeline.link_citations("X holds [1]; see also [2].", &session.references);
    assert_eq!(linked, format!("X holds [1]({}); see also [2].", uri));
}

fn pipeline_for(store: Arc<FileStore>) -> ResearchPipeline {
    pipeline(store, MockToolModel::new())
}
