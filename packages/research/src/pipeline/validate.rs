//! Cross-check final claims against what extraction actually produced.
//!
//! A claimed result survives only if its URL was extracted and its line
//! ranges intersect the extracted selections. Surviving ranges are cut
//! down to the intersection and carry the extracted text. Running the
//! validator on its own output changes nothing.

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::{DropReason, ToolFailure};
use crate::types::{
    extraction::ExtractOutcome,
    normalize::normalize_url,
    result::SearchResult,
    selection::{describe_ranges, sort_selections, LineRange, LineSelection},
};

/// Validated results plus what was dropped or clipped.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub results: Vec<SearchResult>,
    pub failures: Vec<ToolFailure>,
}

/// Validate claimed results against the run's extraction history.
pub fn validate_results(claims: Vec<SearchResult>, history: &[ExtractOutcome]) -> ValidationReport {
    let mut report = ValidationReport::default();

    for claim in claims {
        let key = normalize_url(&claim.url);
        let evidence: Vec<&ExtractOutcome> = history
            .iter()
            .filter(|o| normalize_url(&o.url) == key)
            .collect();

        match validate_one(claim, &evidence) {
            Ok((result, clip)) => {
                if let Some(failure) = clip {
                    debug!(url = %result.url, "Clipped claimed selections");
                    report.failures.push(failure);
                }
                report.results.push(result);
            }
            Err(failure) => {
                warn!(failure = %failure, "Dropped claimed result");
                report.failures.push(failure);
            }
        }
    }

    report
}

fn validate_one(
    mut claim: SearchResult,
    evidence: &[&ExtractOutcome],
) -> Result<(SearchResult, Option<ToolFailure>), ToolFailure> {
    let url = claim.url.clone();
    let dropped = |reason| ToolFailure::ValidationDropped {
        url: url.clone(),
        reason,
    };

    if evidence.is_empty() {
        return Err(dropped(DropReason::UnknownUrl));
    }
    fill_from_evidence(&mut claim, evidence);

    if claim.is_flagged() {
        claim.selections.clear();
        return Ok((claim, None));
    }

    let extracted: Vec<&LineSelection> = evidence
        .iter()
        .filter(|o| o.is_usable())
        .flat_map(|o| o.selections.iter())
        .collect();

    if claim.selections.is_empty() {
        // No claim of its own: a page that only ever failed keeps its flags.
        if extracted.is_empty() {
            if let Some(outcome) = evidence.iter().rev().find(|o| o.broken || o.irrelevant || o.error.is_some()) {
                claim.broken = outcome.broken;
                claim.irrelevant = outcome.irrelevant;
                claim.error = outcome.error.clone();
                return Ok((claim, None));
            }
        }
        return Err(dropped(DropReason::NoSelections));
    }

    let claimed: IndexMap<String, LineRange> = claim
        .selections
        .iter()
        .filter_map(LineSelection::range)
        .map(|r| (r.key(), r))
        .collect();

    let mut resolved: IndexMap<String, LineSelection> = IndexMap::new();
    for range in claimed.values() {
        for source in &extracted {
            let Some(overlap) = source.range().and_then(|s| s.overlap(range)) else {
                continue;
            };
            if resolved.contains_key(&overlap.key()) {
                continue;
            }
            if let Some(text) = resolve_text(&overlap, &extracted) {
                resolved.insert(overlap.key(), LineSelection::new(overlap.start, overlap.end, text));
            }
        }
    }

    if resolved.is_empty() {
        return Err(dropped(DropReason::NoOverlap));
    }

    let clipped = claimed.len() != resolved.len() || claimed.keys().any(|k| !resolved.contains_key(k));
    let mut selections: Vec<LineSelection> = resolved.into_values().collect();
    sort_selections(&mut selections);

    let clip = clipped.then(|| {
        let ranges: Vec<LineRange> = selections.iter().filter_map(LineSelection::range).collect();
        dropped(DropReason::Clipped {
            kept: describe_ranges(&ranges),
        })
    });

    claim.selections = selections;
    Ok((claim, clip))
}

/// Backing text for `target`: an extracted selection with the same bounds,
/// or the matching lines of one that contains it.
fn resolve_text(target: &LineRange, extracted: &[&LineSelection]) -> Option<String> {
    extracted
        .iter()
        .find(|s| s.start == target.start && s.end == target.end)
        .map(|s| s.text.clone())
        .or_else(|| extracted.iter().find_map(|s| s.slice(target)))
}

/// Copy title, page id, line count and (if missing) viewpoint from the
/// latest extraction of the URL.
fn fill_from_evidence(claim: &mut SearchResult, evidence: &[&ExtractOutcome]) {
    let Some(latest) = evidence.last() else {
        return;
    };
    if claim.title.is_none() {
        claim.title = evidence.iter().rev().find_map(|o| o.title.clone());
    }
    if claim.page_id.is_none() {
        claim.page_id = evidence.iter().rev().find_map(|o| o.page_id.clone());
    }
    if claim.line_count.is_none() {
        claim.line_count = evidence.iter().rev().find_map(|o| o.line_count);
    }
    if claim.viewpoint.trim().is_empty() {
        claim.viewpoint = evidence
            .iter()
            .rev()
            .find(|o| o.is_usable())
            .map(|o| o.viewpoint.clone())
            .unwrap_or_else(|| latest.viewpoint.clone());
    }
}
