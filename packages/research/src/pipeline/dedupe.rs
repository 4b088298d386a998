//! Merge equivalent results into a minimal evidence set.
//!
//! Results are keyed by normalized viewpoint, so two URLs making the same
//! claim collapse into one row. Rows without a viewpoint are keyed by URL.

use indexmap::IndexMap;

use crate::types::{
    normalize::{normalize_text, normalize_url},
    result::SearchResult,
    selection::{sort_selections, LineSelection},
};

/// Merge key: normalized viewpoint, or `url:<normalized url>` when the
/// viewpoint is empty.
pub fn merge_key(result: &SearchResult) -> String {
    let viewpoint = normalize_text(&result.viewpoint);
    if viewpoint.is_empty() {
        format!("url:{}", normalize_url(&result.url))
    } else {
        viewpoint
    }
}

/// How much evidence a row carries.
pub fn score(result: &SearchResult) -> usize {
    let usable = if result.has_usable_evidence() { 10 } else { 0 };
    let has_content = result
        .content
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty());
    usable + result.selections.len().min(5) + usize::from(has_content)
}

/// Deduplicate results, keeping first-seen order of merge keys.
pub fn dedupe_results(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut merged: IndexMap<String, SearchResult> = IndexMap::new();

    for result in results {
        let key = merge_key(&result);
        match merged.get_mut(&key) {
            Some(existing) => {
                let previous = std::mem::take(existing);
                *existing = merge(previous, result);
            }
            None => {
                merged.insert(key, result);
            }
        }
    }

    merged.into_values().collect()
}

fn merge(existing: SearchResult, incoming: SearchResult) -> SearchResult {
    let mut merged = if normalize_url(&existing.url) == normalize_url(&incoming.url) {
        union_same_url(existing, incoming)
    } else if score(&incoming) > score(&existing) {
        absorb(incoming, existing)
    } else {
        absorb(existing, incoming)
    };

    if !merged.selections.is_empty() {
        merged.broken = false;
        merged.irrelevant = false;
        merged.error = None;
    }
    merged
}

fn union_same_url(mut base: SearchResult, other: SearchResult) -> SearchResult {
    let mut seen: IndexMap<String, LineSelection> = IndexMap::new();
    for selection in base.selections.drain(..).chain(other.selections) {
        seen.entry(selection.dedup_key()).or_insert(selection);
    }
    let mut selections: Vec<LineSelection> = seen.into_values().collect();
    sort_selections(&mut selections);
    base.selections = selections;

    base.broken |= other.broken;
    base.irrelevant |= other.irrelevant;
    base.error = base.error.or(other.error);
    base.content = base.content.or(other.content);
    fill_missing(&mut base, other.title, other.page_id, other.line_count);
    base
}

fn absorb(mut winner: SearchResult, loser: SearchResult) -> SearchResult {
    fill_missing(&mut winner, loser.title, loser.page_id, loser.line_count);
    winner
}

fn fill_missing(
    target: &mut SearchResult,
    title: Option<String>,
    page_id: Option<String>,
    line_count: Option<usize>,
) {
    if target.title.is_none() {
        target.title = title;
    }
    if target.page_id.is_none() {
        target.page_id = page_id;
    }
    if target.line_count.is_none() {
        target.line_count = line_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(url: &str, viewpoint: &str, ranges: &[(usize, usize)]) -> SearchResult {
        ranges.iter().fold(
            SearchResult::new(url).with_viewpoint(viewpoint),
            |r, (s, e)| r.with_selection(LineSelection::new(*s, *e, format!("{s}-{e}"))),
        )
    }

    #[test]
    fn test_same_url_same_viewpoint_unions_sorted() {
        let rows = dedupe_results(vec![
            row("https://a", "Tokio is fast", &[(9, 10), (3, 5)]),
            row("https://a/", "  tokio IS   fast ", &[(3, 5), (1, 2)]),
        ]);
        assert_eq!(rows.len(), 1);
        let ranges: Vec<(usize, usize)> = rows[0].selections.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(1, 2), (3, 5), (9, 10)]);
    }

    #[test]
    fn test_higher_score_wins_across_urls_and_absorbs_fields() {
        let weak = SearchResult::new("https://weak")
            .with_viewpoint("same claim")
            .with_title("Weak title")
            .broken();
        let mut strong = row("https://strong", "Same claim", &[(1, 1)]);
        strong.page_id = Some("p-strong".into());

        let rows = dedupe_results(vec![weak, strong]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].url, "https://strong");
        assert_eq!(rows[0].title.as_deref(), Some("Weak title"));
        assert_eq!(rows[0].page_id.as_deref(), Some("p-strong"));
        assert!(!rows[0].broken);
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let rows = dedupe_results(vec![
            row("https://first", "claim", &[(1, 1)]),
            row("https://second", "claim", &[(2, 2)]),
        ]);
        assert_eq!(rows[0].url, "https://first");
    }

    #[test]
    fn test_flags_survive_when_no_selections() {
        let rows = dedupe_results(vec![
            SearchResult::new("https://b").with_viewpoint("dead").broken(),
            SearchResult::new("https://b").with_viewpoint("dead").with_error("404"),
        ]);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].broken);
        assert_eq!(rows[0].error.as_deref(), Some("404"));
    }

    #[test]
    fn test_empty_viewpoints_do_not_collapse_across_urls() {
        let rows = dedupe_results(vec![
            SearchResult::new("https://a").broken(),
            SearchResult::new("https://b").broken(),
        ]);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_score() {
        let mut r = row("https://a", "v", &[(1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (6, 6)]);
        assert_eq!(score(&r), 15);
        r.content = Some("snippet".into());
        assert_eq!(score(&r), 16);
        assert_eq!(score(&r.clone().broken()), 6);
    }
}
