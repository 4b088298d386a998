//! Research pipeline - the core of the library.
//!
//! The pipeline orchestrates:
//! - Search planning with budgeted `search` / `extract` / `finalize` tools
//! - Per-page evidence extraction over numbered lines
//! - Validation of claimed line ranges against extracted evidence
//! - Deduplication, reference numbering and citation linking

pub mod agent;
pub mod citations;
pub mod dedupe;
pub mod document;
pub mod events;
pub mod extractor;
pub mod guard;
pub mod orchestrator;
pub mod prompts;
pub mod references;
pub mod research;
pub mod validate;

pub use agent::{ExtractTool, ExtractionAgent};
pub use citations::link_citations;
pub use dedupe::{dedupe_results, merge_key};
pub use document::{GrepOptions, NumberedDocument};
pub use events::{EventKind, EventLog, ResearchEvent};
pub use extractor::{ExtractReport, Extractor};
pub use guard::CallGuard;
pub use orchestrator::{fallback_results, OrchestratorCall, OrchestratorOutput, SearchOrchestrator};
pub use prompts::{format_orchestrator_prompt, EXTRACT_PROMPT, ORCHESTRATOR_PROMPT};
pub use references::build_references;
pub use research::{ResearchOutcome, ResearchPipeline};
pub use validate::{validate_results, ValidationReport};

/// Cut `s` to at most `max_bytes` without splitting a character.
pub(crate) fn truncate_for_log(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
