//! Search orchestrator: the bounded tool-calling loop over `search`,
//! `extract` and `finalize`.
//!
//! States: exploring (tool calls) → finalizing (payload from `finalize`, or
//! a fallback rebuilt from extract history) → validated output. Budget and
//! repeat guards fail individual calls, never the run.

use futures::future::join_all;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ResearchError, Result, SearchError, ToolFailure};
use crate::traits::{
    model::{ChatMessage, ModelRequest, ToolCall, ToolDefinition, ToolModel},
    searcher::{SearchHit, WebSearcher},
};
use crate::types::{
    config::OrchestratorConfig,
    extraction::ExtractOutcome,
    normalize::normalize_url,
    result::SearchResult,
    selection::LineSelection,
};

use super::agent::RangeArg;
use super::events::{EventKind, EventLog};
use super::extractor::Extractor;
use super::guard::CallGuard;
use super::prompts::{format_orchestrator_prompt, format_orchestrator_task};
use super::truncate_for_log;
use super::validate::validate_results;

/// Arguments of `search`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchArgs {
    pub query: String,
}

/// Arguments of `extract`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExtractArgs {
    pub url: String,

    /// Defaults to the research query
    #[serde(default)]
    pub query: Option<String>,
}

/// One claimed result in the `finalize` payload.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FinalResultArg {
    pub url: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub viewpoint: String,

    /// Line ranges taken from the extract output
    #[serde(default)]
    pub selections: Vec<RangeArg>,

    #[serde(default)]
    pub broken: bool,

    #[serde(default)]
    pub irrelevant: bool,

    #[serde(default)]
    pub error: Option<String>,
}

impl FinalResultArg {
    fn into_result(self) -> SearchResult {
        SearchResult {
            url: self.url,
            title: self.title,
            viewpoint: self.viewpoint,
            selections: self
                .selections
                .into_iter()
                .map(|r| LineSelection::new(r.start, r.end, ""))
                .collect(),
            broken: self.broken,
            irrelevant: self.irrelevant,
            error: self.error,
            ..Default::default()
        }
    }
}

/// Arguments of `finalize`.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct FinalizeArgs {
    #[serde(default)]
    pub results: Vec<FinalResultArg>,

    #[serde(default)]
    pub errors: Vec<String>,
}

/// The closed set of orchestrator operations.
#[derive(Debug, Clone)]
pub enum OrchestratorCall {
    Search(SearchArgs),
    Extract(ExtractArgs),
    Finalize(FinalizeArgs),
}

impl OrchestratorCall {
    pub const SEARCH: &'static str = "search";
    pub const EXTRACT: &'static str = "extract";
    pub const FINALIZE: &'static str = "finalize";

    /// Parse a model tool call.
    pub fn parse(call: &ToolCall) -> std::result::Result<Self, String> {
        let bad_args = |e: serde_json::Error| format!("invalid arguments for {}: {}", call.name, e);
        match call.name.as_str() {
            Self::SEARCH => call.parse_args().map(Self::Search).map_err(bad_args),
            Self::EXTRACT => call.parse_args().map(Self::Extract).map_err(bad_args),
            Self::FINALIZE => call.parse_args().map(Self::Finalize).map_err(bad_args),
            other => Err(format!(
                "unknown tool: {} (available: search, extract, finalize)",
                other
            )),
        }
    }

    /// Tool definitions sent with every request.
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::for_args::<SearchArgs>(Self::SEARCH, "Search the web for candidate pages."),
            ToolDefinition::for_args::<ExtractArgs>(
                Self::EXTRACT,
                "Read one page and return its viewpoint and exact supporting line selections.",
            ),
            ToolDefinition::for_args::<FinalizeArgs>(
                Self::FINALIZE,
                "Finish the run with the validated results and any errors.",
            ),
        ]
    }
}

/// What one orchestrator run produced.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorOutput {
    /// Validated results, or error-only rows when `fatal`
    pub results: Vec<SearchResult>,
    pub errors: Vec<String>,

    /// Every search or every extract failed and nothing usable was found
    pub fatal: bool,

    /// `finalize` was called (otherwise the fallback was used)
    pub finalized: bool,

    /// Every extract outcome, in completion order
    pub history: Vec<ExtractOutcome>,
}

/// Mutable state private to one run.
struct RunState {
    guard: CallGuard,
    history: Vec<ExtractOutcome>,
    hits: HashMap<String, SearchHit>,
    errors: Vec<String>,
    search_failures: usize,
    extract_failures: usize,
}

impl RunState {
    fn record(&mut self, failure: &ToolFailure) {
        self.errors.push(failure.to_string());
    }
}

/// Drives search planning and evidence gathering for one query.
pub struct SearchOrchestrator {
    model: Arc<dyn ToolModel>,
    searcher: Arc<dyn WebSearcher>,
    extractor: Arc<Extractor>,
    config: OrchestratorConfig,
}

impl SearchOrchestrator {
    /// Create an orchestrator.
    pub fn new(
        model: Arc<dyn ToolModel>,
        searcher: Arc<dyn WebSearcher>,
        extractor: Arc<Extractor>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            model,
            searcher,
            extractor,
            config,
        }
    }

    /// Run the loop for `query`.
    ///
    /// Partial failures are collected in the output. Only cancellation
    /// is an `Err`.
    pub async fn run(
        &self,
        query: &str,
        search_id: &str,
        events: &EventLog,
        cancel: &CancellationToken,
    ) -> Result<OrchestratorOutput> {
        let mut state = RunState {
            guard: CallGuard::new(&self.config),
            history: Vec::new(),
            hits: HashMap::new(),
            errors: Vec::new(),
            search_failures: 0,
            extract_failures: 0,
        };
        let mut request = ModelRequest {
            system: format_orchestrator_prompt(self.config.max_search_calls, self.config.max_extract_calls),
            messages: vec![ChatMessage::user(format_orchestrator_task(query))],
            tools: OrchestratorCall::definitions(),
        };
        let mut payload: Option<FinalizeArgs> = None;

        for step in 1..=self.config.max_steps {
            if cancel.is_cancelled() {
                return Err(ResearchError::Cancelled);
            }
            events.push(EventKind::StepStarted { step });

            let turn = tokio::select! {
                _ = cancel.cancelled() => return Err(ResearchError::Cancelled),
                turn = self.model.complete(&request) => turn,
            };
            let turn = match turn {
                Ok(turn) => turn,
                Err(ResearchError::Cancelled) => return Err(ResearchError::Cancelled),
                Err(e) => {
                    warn!(step, model = self.model.name(), error = %e, "Orchestrator model call failed");
                    state.errors.push(format!("orchestrator model failed: {}", e));
                    break;
                }
            };

            if let Some(text) = turn.content.as_deref().filter(|t| !t.trim().is_empty()) {
                debug!(step, text = %truncate_for_log(text, 200), "Orchestrator text");
                events.push(EventKind::AssistantText {
                    text: text.to_string(),
                });
            }
            request.messages.push(ChatMessage::from_turn(&turn));

            if turn.tool_calls.is_empty() {
                debug!(step, "Orchestrator stopped calling tools");
                break;
            }

            let replies = self
                .dispatch(&turn.tool_calls, query, search_id, &mut state, &mut payload, events, cancel)
                .await?;
            for (call, reply) in turn.tool_calls.iter().zip(replies) {
                request.messages.push(ChatMessage::tool(&call.id, reply));
            }

            if payload.is_some() {
                break;
            }
        }

        let finalized = payload.is_some();
        let claims = match payload {
            Some(args) => {
                events.push(EventKind::Finalized {
                    results: args.results.len(),
                });
                state
                    .errors
                    .extend(args.errors.into_iter().filter(|e| !e.trim().is_empty()));
                args.results.into_iter().map(FinalResultArg::into_result).collect()
            }
            None => {
                let recovered = fallback_results(&state.history);
                events.push(EventKind::FallbackUsed {
                    recovered: recovered.len(),
                });
                state.record(&ToolFailure::FinalizeMissing {
                    recovered: recovered.len(),
                });
                recovered
            }
        };

        let report = validate_results(claims, &state.history);
        for failure in &report.failures {
            state.record(failure);
        }
        let mut results = report.results;
        for result in &mut results {
            if result.content.is_none() {
                result.content = state
                    .hits
                    .get(&normalize_url(&result.url))
                    .and_then(|h| h.content.clone());
            }
        }

        let fatal = self.is_fatal(&state, &results);
        if fatal {
            warn!(query = %query, errors = state.errors.len(), "All tool calls failed");
            if state.errors.is_empty() {
                state.errors.push("all tool calls failed".to_string());
            }
            results = state
                .errors
                .iter()
                .enumerate()
                .map(|(i, e)| SearchResult::error_row(i + 1, e.clone()))
                .collect();
        }

        info!(
            query = %query,
            finalized,
            fatal,
            results = results.len(),
            searches = state.guard.search_calls(),
            extracts = state.guard.extract_calls(),
            errors = state.errors.len(),
            "Orchestrator run complete"
        );

        Ok(OrchestratorOutput {
            results,
            errors: state.errors,
            fatal,
            finalized,
            history: state.history,
        })
    }

    /// Execute one round of tool calls. Returns one reply per call, in
    /// call order. Extracts of a round run concurrently.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        &self,
        calls: &[ToolCall],
        query: &str,
        search_id: &str,
        state: &mut RunState,
        payload: &mut Option<FinalizeArgs>,
        events: &EventLog,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut replies: Vec<String> = vec![String::new(); calls.len()];
        let mut pending: Vec<(usize, String, String)> = Vec::new();

        for (i, call) in calls.iter().enumerate() {
            events.push(EventKind::ToolCalled {
                tool: call.name.clone(),
                arguments: truncate_for_log(&call.arguments, 500).to_string(),
            });

            match OrchestratorCall::parse(call) {
                Err(message) => {
                    debug!(tool = %call.name, message = %message, "Rejected orchestrator tool call");
                    events.push(EventKind::ToolRejected {
                        tool: call.name.clone(),
                        message: message.clone(),
                    });
                    state.errors.push(message.clone());
                    replies[i] = format!("error: {}", message);
                }
                Ok(OrchestratorCall::Search(args)) => {
                    replies[i] = self.search(&args.query, state, events, cancel).await?;
                }
                Ok(OrchestratorCall::Extract(args)) => match state.guard.admit_extract(&args.url) {
                    Ok(()) => {
                        let extract_query = args
                            .query
                            .filter(|q| !q.trim().is_empty())
                            .unwrap_or_else(|| query.to_string());
                        pending.push((i, args.url, extract_query));
                    }
                    Err(failure) => {
                        state.extract_failures += 1;
                        replies[i] = self.guard_reply(&failure, state, events);
                    }
                },
                Ok(OrchestratorCall::Finalize(args)) => {
                    if payload.is_some() {
                        replies[i] = "error: finalize was already called".to_string();
                    } else {
                        *payload = Some(args);
                        replies[i] = "finalized".to_string();
                    }
                }
            }
        }

        if !pending.is_empty() {
            for (_, url, _) in &pending {
                events.push(EventKind::ExtractStarted { url: url.clone() });
            }
            let reports = join_all(
                pending
                    .iter()
                    .map(|(_, url, q)| self.extractor.extract(url, q, search_id, cancel)),
            )
            .await;

            for ((i, _, _), report) in pending.into_iter().zip(reports) {
                let report = report?;
                let outcome = report.outcome;
                events.push(EventKind::ExtractCompleted {
                    url: outcome.url.clone(),
                    broken: outcome.broken,
                    irrelevant: outcome.irrelevant,
                    selections: outcome.selections.len(),
                    cached: outcome.cached,
                });
                for failure in &report.failures {
                    state.record(failure);
                }
                if outcome.error.is_some() {
                    state.extract_failures += 1;
                }
                replies[i] = render_extract_reply(&outcome);
                state.history.push(outcome);
            }
        }

        Ok(replies)
    }

    async fn search(
        &self,
        search_query: &str,
        state: &mut RunState,
        events: &EventLog,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if let Err(failure) = state.guard.admit_search(search_query) {
            state.search_failures += 1;
            return Ok(self.guard_reply(&failure, state, events));
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(ResearchError::Cancelled),
            result = self.searcher.search(
                search_query,
                self.config.max_results_per_search,
                Some(self.config.search_depth),
            ) => result,
        };

        let error = match result {
            Ok(hits) => {
                let hits: Vec<SearchHit> = hits.into_iter().filter(|h| h.url.is_some()).collect();
                if !hits.is_empty() {
                    info!(query = %search_query, hits = hits.len(), "Search complete");
                    events.push(EventKind::SearchCompleted {
                        query: search_query.to_string(),
                        hits: hits.len(),
                        error: None,
                    });
                    for hit in &hits {
                        if let Some(url) = &hit.url {
                            state.hits.insert(normalize_url(url), hit.clone());
                        }
                    }
                    return Ok(render_search_reply(&hits));
                }
                SearchError::Empty {
                    query: search_query.to_string(),
                }
            }
            Err(e) => e,
        };

        warn!(query = %search_query, error = %error, "Search failed");
        state.search_failures += 1;
        let message = format!("search \"{}\" failed: {}", search_query, error);
        state.errors.push(message.clone());
        events.push(EventKind::SearchCompleted {
            query: search_query.to_string(),
            hits: 0,
            error: Some(error.to_string()),
        });
        Ok(format!("error: {}", message))
    }

    fn guard_reply(&self, failure: &ToolFailure, state: &mut RunState, events: &EventLog) -> String {
        let message = failure.to_string();
        warn!(message = %message, "Guard blocked tool call");
        events.push(EventKind::GuardTriggered {
            message: message.clone(),
        });
        state.errors.push(message.clone());
        format!("error: {}", message)
    }

    fn is_fatal(&self, state: &RunState, results: &[SearchResult]) -> bool {
        if results.iter().any(SearchResult::has_usable_evidence) {
            return false;
        }
        let searches = state.guard.search_calls();
        let extracts = state.guard.extract_calls();
        (searches > 0 && state.search_failures >= searches)
            || (extracts > 0 && state.extract_failures >= extracts)
    }
}

/// One result per distinct URL in the extract history, preferring an
/// outcome with usable evidence over the latest one.
pub fn fallback_results(history: &[ExtractOutcome]) -> Vec<SearchResult> {
    let mut by_url: IndexMap<String, &ExtractOutcome> = IndexMap::new();
    for outcome in history {
        let key = normalize_url(&outcome.url);
        match by_url.get(&key) {
            Some(existing) if existing.is_usable() && !outcome.is_usable() => {}
            _ => {
                by_url.insert(key, outcome);
            }
        }
    }

    by_url
        .into_values()
        .map(|o| SearchResult {
            url: o.url.clone(),
            title: o.title.clone(),
            viewpoint: o.viewpoint.clone(),
            selections: o.selections.clone(),
            broken: o.broken,
            irrelevant: o.irrelevant,
            error: o.error.clone(),
            content: None,
            page_id: o.page_id.clone(),
            line_count: o.line_count,
        })
        .collect()
}

fn render_search_reply(hits: &[SearchHit]) -> String {
    let rows: Vec<serde_json::Value> = hits
        .iter()
        .map(|h| {
            serde_json::json!({
                "url": h.url,
                "title": h.title,
                "content": h.content.as_deref().map(|c| truncate_for_log(c, 400)),
            })
        })
        .collect();
    serde_json::Value::Array(rows).to_string()
}

fn render_extract_reply(outcome: &ExtractOutcome) -> String {
    serde_json::json!({
        "url": outcome.url,
        "title": outcome.title,
        "viewpoint": outcome.viewpoint,
        "broken": outcome.broken,
        "irrelevant": outcome.irrelevant,
        "error": outcome.error,
        "selections": outcome.selections,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::agent::ExtractionAgent;
    use crate::stores::MemoryStore;
    use crate::testing::{MockFetcher, MockToolModel, MockWebSearcher};
    use crate::traits::model::ModelTurn;
    use crate::types::config::ExtractAgentConfig;

    fn orchestrator(
        model: MockToolModel,
        searcher: MockWebSearcher,
        fetcher: MockFetcher,
        config: OrchestratorConfig,
    ) -> (Arc<MockWebSearcher>, SearchOrchestrator) {
        let model: Arc<MockToolModel> = Arc::new(model);
        let searcher = Arc::new(searcher);
        let agent = ExtractionAgent::new(model.clone(), ExtractAgentConfig::default());
        let extractor = Arc::new(Extractor::new(
            Arc::new(MemoryStore::new()),
            Arc::new(fetcher),
            agent,
        ));
        let orchestrator = SearchOrchestrator::new(model, searcher.clone(), extractor, config);
        (searcher, orchestrator)
    }

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::with_json(id, name, args)
    }

    #[test]
    fn test_unknown_tool_is_rejected_with_message() {
        let err = OrchestratorCall::parse(&call("1", "browse", serde_json::json!({}))).unwrap_err();
        assert!(err.contains("unknown tool: browse"));

        let err = OrchestratorCall::parse(&call("2", "search", serde_json::json!({"q": 1}))).unwrap_err();
        assert!(err.starts_with("invalid arguments for search"));
    }

    #[test]
    fn test_fallback_prefers_usable_outcome_per_url() {
        let mut usable = ExtractOutcome::failed("https://a", "q", "x");
        usable.broken = false;
        usable.error = None;
        usable.selections = vec![LineSelection::new(1, 1, "a")];
        let later_failure = ExtractOutcome::failed("https://a/", "q", "timeout");
        let other = ExtractOutcome::failed("https://b", "q", "404");

        let results = fallback_results(&[usable, later_failure, other]);
        assert_eq!(results.len(), 2);
        assert!(results[0].has_usable_evidence());
        assert!(results[1].broken);
    }

    #[tokio::test]
    async fn test_search_budget_blocks_without_calling_searcher() {
        let model = MockToolModel::new()
            .with_turn(ModelTurn::calls(vec![
                call("1", "search", serde_json::json!({"query": "one"})),
                call("2", "search", serde_json::json!({"query": "two"})),
            ]))
            .with_turn(ModelTurn::calls(vec![call("3", "finalize", serde_json::json!({}))]));
        let config = OrchestratorConfig {
            max_search_calls: 1,
            ..Default::default()
        };
        let (searcher, orchestrator) = orchestrator(
            model,
            MockWebSearcher::new().with_urls("one", &["https://a"]),
            MockFetcher::new(),
            config,
        );

        let events = EventLog::new();
        let output = orchestrator
            .run("q", "s", &events, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(searcher.calls(), vec!["one"]);
        assert!(output.finalized);
        assert!(output
            .errors
            .iter()
            .any(|e| e == "search budget exceeded: call 2 exceeds the limit of 1"));
        assert!(events
            .snapshot()
            .iter()
            .any(|e| matches!(e.kind, EventKind::GuardTriggered { .. })));
    }

    #[tokio::test]
    async fn test_all_searches_failing_is_fatal_with_error_rows() {
        let model = MockToolModel::new()
            .with_turn(ModelTurn::calls(vec![call("1", "search", serde_json::json!({"query": "x"}))]))
            .with_turn(ModelTurn::calls(vec![call("2", "finalize", serde_json::json!({}))]));
        let (_, orchestrator) = orchestrator(
            model,
            MockWebSearcher::new().fail_query("x", 502),
            MockFetcher::new(),
            OrchestratorConfig::default(),
        );

        let output = orchestrator
            .run("x", "s", &EventLog::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(output.fatal);
        assert_eq!(output.results[0].url, "search://subagent-error/1");
        assert!(output.results[0].error.as_deref().unwrap().contains("HTTP 502"));
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_model_call() {
        let model = MockToolModel::new();
        let (_, orchestrator) = orchestrator(
            model,
            MockWebSearcher::new(),
            MockFetcher::new(),
            OrchestratorConfig::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orchestrator.run("q", "s", &EventLog::new(), &cancel).await;
        assert!(matches!(result, Err(ResearchError::Cancelled)));
    }
}
