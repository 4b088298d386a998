//! LLM prompts for the research pipeline.
//!
//! The orchestrator prompt drives search planning and the final payload;
//! the extraction prompt drives the per-URL line-selection agent.

/// System prompt for the search orchestrator.
pub const ORCHESTRATOR_PROMPT: &str = r#"You are a research planner. Gather web evidence for the user's query.

Tools:
- search(query): find candidate pages. Returns url, title and a short snippet per hit.
- extract(url, query?): read one page and return a viewpoint plus exact line selections
  that support it, or flag the page broken/irrelevant. Issue several extract calls in
  one turn to read pages in parallel.
- finalize(results, errors): end the run. Each result names a URL you extracted, the
  viewpoint it supports and the line ranges (start, end) backing that viewpoint, taken
  from the extract output. Mark unusable pages broken or irrelevant instead of
  inventing ranges.

Rules:
- Only cite URLs you have extracted. Ranges that do not overlap extracted selections
  are discarded.
- Do not repeat identical searches or extract the same URL twice.
- Budgets: at most {max_search} searches and {max_extract} extracts.
- Call finalize exactly once when you have enough evidence or the budget is spent."#;

/// System prompt for the per-URL extraction agent.
pub const EXTRACT_PROMPT: &str = r#"You read one web page and decide what it says about a query.

The page is given as numbered lines (`  12| text`). Tools:
- grep(pattern, flags?, context_before?, context_after?, max_matches?): search lines by
  regular expression. flags: "i" for case-insensitive, "F" for a literal pattern.
- read_lines(start, end): read an inclusive 1-based line range.
- write_extract_result(viewpoint, selections, broken, irrelevant, reason?): finish. Call
  it exactly once.

Rules:
- viewpoint: one or two sentences stating what the page claims about the query.
- selections: the smallest line ranges that quote the evidence, at most 5.
- broken: the page is an error page, paywall, captcha or otherwise unreadable.
- irrelevant: the page does not address the query. Irrelevant pages have no selections.
- Never invent line numbers. Use grep or read_lines when the page is only partly shown."#;

/// Fill the orchestrator prompt with the run's budgets.
pub fn format_orchestrator_prompt(max_search: usize, max_extract: usize) -> String {
    ORCHESTRATOR_PROMPT
        .replace("{max_search}", &max_search.to_string())
        .replace("{max_extract}", &max_extract.to_string())
}

/// First user message of an orchestrator run.
pub fn format_orchestrator_task(query: &str) -> String {
    format!("Research query: {}", query)
}

/// First user message of an extraction run.
///
/// `shown` is the numbered rendering of the visible lines; `total_lines`
/// and `total_chars` describe the whole page.
pub fn format_extract_task(
    query: &str,
    shown: &str,
    shown_lines: usize,
    total_lines: usize,
    total_chars: usize,
) -> String {
    let header = if shown_lines < total_lines {
        format!(
            "Page has {} lines ({} chars). Showing lines 1-{} only; use grep and read_lines for the rest.",
            total_lines, total_chars, shown_lines
        )
    } else {
        format!("Page has {} lines ({} chars).", total_lines, total_chars)
    };

    format!("Query: {}\n\n{}\n\n{}", query, header, shown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestrator_prompt_carries_budgets() {
        let prompt = format_orchestrator_prompt(3, 7);
        assert!(prompt.contains("at most 3 searches and 7 extracts"));
    }

    #[test]
    fn test_extract_task_mentions_preview() {
        let task = format_extract_task("q", "   1| a", 1, 500, 9000);
        assert!(task.contains("Showing lines 1-1 only"));
        assert!(!format_extract_task("q", "   1| a", 1, 1, 1).contains("Showing"));
    }
}
