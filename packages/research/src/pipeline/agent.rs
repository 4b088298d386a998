//! Per-URL extraction agent.
//!
//! A bounded tool loop over one page. The model explores the numbered
//! lines with `grep` and `read_lines`, then calls `write_extract_result`
//! once. Reported ranges are re-cut from the page so selection text is
//! always the page's own text.

use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ResearchError, Result};
use crate::traits::model::{ChatMessage, ModelRequest, ToolCall, ToolDefinition, ToolModel};
use crate::types::config::ExtractAgentConfig;
use crate::types::extraction::AgentExtraction;
use crate::types::selection::{sort_selections, LineSelection};

use super::document::{GrepOptions, NumberedDocument};
use super::prompts::{format_extract_task, EXTRACT_PROMPT};
use super::truncate_for_log;

/// Arguments of `grep`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GrepArgs {
    /// Regular expression (or literal text with flag "F")
    pub pattern: String,

    /// "i" for case-insensitive, "F" for a literal pattern
    #[serde(default)]
    pub flags: Option<String>,

    #[serde(default)]
    pub context_before: Option<usize>,

    #[serde(default)]
    pub context_after: Option<usize>,

    #[serde(default)]
    pub max_matches: Option<usize>,
}

/// Arguments of `read_lines`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadLinesArgs {
    /// First line, 1-based
    pub start: usize,

    /// Last line, inclusive
    pub end: usize,
}

/// A line range reported by a model.
#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
pub struct RangeArg {
    pub start: usize,
    pub end: usize,
}

/// Arguments of `write_extract_result`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WriteExtractResultArgs {
    /// What the page claims about the query
    #[serde(default)]
    pub viewpoint: String,

    /// Line ranges quoting the evidence
    #[serde(default)]
    pub selections: Vec<RangeArg>,

    /// Page is unreadable (error page, paywall, captcha)
    #[serde(default)]
    pub broken: bool,

    /// Page does not address the query
    #[serde(default)]
    pub irrelevant: bool,

    /// Why the page is broken or irrelevant
    #[serde(default)]
    pub reason: Option<String>,
}

/// The closed set of tools the extraction agent can call.
#[derive(Debug, Clone)]
pub enum ExtractTool {
    Grep(GrepArgs),
    ReadLines(ReadLinesArgs),
    WriteExtractResult(WriteExtractResultArgs),
}

impl ExtractTool {
    pub const GREP: &'static str = "grep";
    pub const READ_LINES: &'static str = "read_lines";
    pub const WRITE_EXTRACT_RESULT: &'static str = "write_extract_result";

    /// Parse a model tool call. Unknown names and bad arguments come
    /// back as a message for the model.
    pub fn parse(call: &ToolCall) -> std::result::Result<Self, String> {
        let bad_args = |e: serde_json::Error| format!("invalid arguments for {}: {}", call.name, e);
        match call.name.as_str() {
            Self::GREP => call.parse_args().map(Self::Grep).map_err(bad_args),
            Self::READ_LINES => call.parse_args().map(Self::ReadLines).map_err(bad_args),
            Self::WRITE_EXTRACT_RESULT => call
                .parse_args()
                .map(Self::WriteExtractResult)
                .map_err(bad_args),
            other => Err(format!(
                "unknown tool: {} (available: grep, read_lines, write_extract_result)",
                other
            )),
        }
    }

    /// Tool definitions sent with every request.
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::for_args::<GrepArgs>(
                Self::GREP,
                "Search page lines with a regular expression and show matches with context.",
            ),
            ToolDefinition::for_args::<ReadLinesArgs>(
                Self::READ_LINES,
                "Read an inclusive, 1-based range of page lines.",
            ),
            ToolDefinition::for_args::<WriteExtractResultArgs>(
                Self::WRITE_EXTRACT_RESULT,
                "Finish: report the viewpoint and supporting line ranges, or flag the page.",
            ),
        ]
    }
}

/// Runs the extraction tool loop for one page.
pub struct ExtractionAgent {
    model: Arc<dyn ToolModel>,
    config: ExtractAgentConfig,
}

impl ExtractionAgent {
    /// Create an agent.
    pub fn new(model: Arc<dyn ToolModel>, config: ExtractAgentConfig) -> Self {
        Self { model, config }
    }

    /// Extract a viewpoint and selections from page lines.
    ///
    /// Model and tool failures are reported inside the extraction
    /// (`broken` with `error`). Only cancellation is an `Err`.
    pub async fn extract(
        &self,
        query: &str,
        lines: &[String],
        cancel: &CancellationToken,
    ) -> Result<AgentExtraction> {
        if lines.is_empty() {
            debug!(query = %query, "Page has no lines, skipping model");
            return Ok(AgentExtraction::broken("page has no readable lines"));
        }

        let document = NumberedDocument::new(lines.to_vec());
        let (shown, shown_lines) = document.initial_view(&self.config);
        let mut request = ModelRequest {
            system: EXTRACT_PROMPT.to_string(),
            messages: vec![ChatMessage::user(format_extract_task(
                query,
                &shown,
                shown_lines,
                document.line_count(),
                document.char_count(),
            ))],
            tools: ExtractTool::definitions(),
        };

        let mut last_text = String::new();
        for step in 1..=self.config.max_steps {
            if cancel.is_cancelled() {
                return Err(ResearchError::Cancelled);
            }

            let turn = tokio::select! {
                _ = cancel.cancelled() => return Err(ResearchError::Cancelled),
                turn = self.model.complete(&request) => turn,
            };
            let turn = match turn {
                Ok(turn) => turn,
                Err(e) => {
                    warn!(step, error = %e, "Extraction model call failed");
                    let mut failed = AgentExtraction::broken(format!("extraction model failed: {}", e));
                    failed.raw_model_output = last_text;
                    return Ok(failed);
                }
            };

            if let Some(text) = &turn.content {
                debug!(step, text = %truncate_for_log(text, 200), "Extraction model text");
                last_text = text.clone();
            }
            request.messages.push(ChatMessage::from_turn(&turn));

            if turn.tool_calls.is_empty() {
                break;
            }

            for call in &turn.tool_calls {
                let reply = match ExtractTool::parse(call) {
                    Ok(ExtractTool::WriteExtractResult(args)) => {
                        let extraction = self.finish(&document, args, &call.arguments);
                        info!(
                            step,
                            broken = extraction.broken,
                            irrelevant = extraction.irrelevant,
                            selections = extraction.selections.len(),
                            "Extraction finished"
                        );
                        return Ok(extraction);
                    }
                    Ok(ExtractTool::Grep(args)) => {
                        let options = GrepOptions {
                            pattern: &args.pattern,
                            flags: args.flags.as_deref(),
                            context_before: args.context_before.unwrap_or(0),
                            context_after: args.context_after.unwrap_or(0),
                            max_matches: args.max_matches,
                        };
                        document
                            .grep(&options, &self.config)
                            .unwrap_or_else(|e| format!("error: {}", e))
                    }
                    Ok(ExtractTool::ReadLines(args)) => document
                        .read_lines(args.start, args.end, self.config.read_lines_max_span)
                        .unwrap_or_else(|e| format!("error: {}", e)),
                    Err(message) => {
                        debug!(tool = %call.name, message = %message, "Rejected extraction tool call");
                        format!("error: {}", message)
                    }
                };
                request.messages.push(ChatMessage::tool(&call.id, reply));
            }
        }

        warn!(query = %query, "Extraction ended without write_extract_result");
        let mut failed = AgentExtraction::broken(format!(
            "extraction agent stopped without calling {}",
            ExtractTool::WRITE_EXTRACT_RESULT
        ));
        failed.raw_model_output = last_text;
        Ok(failed)
    }

    /// Turn the finalize arguments into an extraction grounded in the page.
    fn finish(&self, document: &NumberedDocument, args: WriteExtractResultArgs, raw: &str) -> AgentExtraction {
        let mut selections: Vec<LineSelection> = args
            .selections
            .iter()
            .filter_map(|r| {
                let selection = LineSelection::from_lines(document.lines(), r.start, r.end);
                if selection.is_none() {
                    debug!(start = r.start, end = r.end, "Discarding out-of-range selection");
                }
                selection
            })
            .collect();
        sort_selections(&mut selections);
        selections.dedup();

        let error = args.broken.then(|| {
            args.reason
                .clone()
                .unwrap_or_else(|| "page content unavailable".to_string())
        });

        AgentExtraction {
            viewpoint: args.viewpoint.trim().to_string(),
            broken: args.broken,
            irrelevant: args.irrelevant,
            selections,
            raw_model_output: raw.to_string(),
            error,
            finalized: true,
        }
        .normalized()
    }
}
