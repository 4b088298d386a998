//! Turn validated evidence into sequentially numbered references.

use std::collections::HashSet;

use crate::types::{
    config::ReferenceConfig,
    normalize::{normalize_text, normalize_url},
    reference::{Reference, ReferenceUri},
    result::SearchResult,
};

/// Build references for one search session.
///
/// Takes up to `max_selections_per_result` selections from each usable
/// result (in their stored order), clips text, and skips near-identical
/// references. Ids start at 1 in emission order.
pub fn build_references(
    results: &[SearchResult],
    project_id: &str,
    search_id: &str,
    config: &ReferenceConfig,
) -> Vec<Reference> {
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    let mut references = Vec::new();

    for result in results.iter().filter(|r| !r.broken && !r.irrelevant) {
        let url_key = normalize_url(&result.url);
        let viewpoint_key = normalize_text(&result.viewpoint);

        for selection in result.selections.iter().take(config.max_selections_per_result) {
            let text = clip_chars(&selection.text, config.max_text_chars);
            let key = (url_key.clone(), viewpoint_key.clone(), normalize_text(&text));
            if !seen.insert(key) {
                continue;
            }

            let ref_id = references.len() + 1;
            references.push(Reference {
                ref_id,
                uri: ReferenceUri::new(project_id, search_id, ref_id).to_string(),
                page_id: result.page_id.clone().unwrap_or_default(),
                url: result.url.clone(),
                title: result.title.clone(),
                viewpoint: result.viewpoint.clone(),
                start_line: selection.start,
                end_line: selection.end,
                text,
            });
        }
    }

    references
}

/// Keep at most `max` characters.
fn clip_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}
