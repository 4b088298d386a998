//! Rewrite bracketed citation markers into links to references.
//!
//! Recognized markers: `[3]`, `[^3]`, `[1, 2]`, `[2-4]`, lists separated by
//! CJK punctuation (`[1，2]`, `[1、2]`, `[1；2]`), and markers that are
//! already links (`[3](evidence://...)`). Each marker becomes comma-joined
//! `[id](uri)` links, so running the linker twice gives the same text.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;

use crate::types::config::CitationConfig;
use crate::types::reference::Reference;

lazy_static! {
    // Bracket group of ids, optional existing link target with a scheme
    static ref MARKER_REGEX: Regex = Regex::new(
        r"\[(\^?\s*\d{1,6}(?:\s*(?:[,，、;；]|[-–~])\s*\^?\s*\d{1,6})*)\s*\](\([^()\s]*://[^()\s]*\))?"
    ).unwrap();

    static ref LIST_SEPARATOR: Regex = Regex::new(r"[,，、;；]").unwrap();

    static ref RANGE_SEPARATOR: Regex = Regex::new(r"[-–~]").unwrap();
}

/// Link citation markers in `text` to `references`.
pub fn link_citations(text: &str, references: &[Reference], config: &CitationConfig) -> String {
    let uris: HashMap<usize, &str> = references
        .iter()
        .map(|r| (r.ref_id, r.uri.as_str()))
        .collect();

    MARKER_REGEX
        .replace_all(text, |caps: &Captures<'_>| {
            let original = caps[0].to_string();
            let Some(ids) = expand_ids(&caps[1], config.max_range_width) else {
                return original;
            };
            if !ids.iter().any(|id| uris.contains_key(id)) {
                return original;
            }

            ids.iter()
                .map(|id| match uris.get(id) {
                    Some(uri) => format!("[{}]({})", id, uri),
                    None => format!("[{}]", id),
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .into_owned()
}

/// Expand `1, 2-4` into `[1, 2, 3, 4]`.
///
/// Ranges are truncated to `max_width` ids. A descending range makes the
/// whole marker unparseable.
fn expand_ids(group: &str, max_width: usize) -> Option<Vec<usize>> {
    let mut ids = Vec::new();
    for part in LIST_SEPARATOR.split(group) {
        let bounds: Vec<usize> = RANGE_SEPARATOR
            .split(part)
            .map(|n| n.trim().trim_start_matches('^').trim().parse::<usize>())
            .collect::<Result<_, _>>()
            .ok()?;

        match bounds.as_slice() {
            [id] => ids.push(*id),
            [start, end] if start <= end => {
                ids.extend((*start..=*end).take(max_width.max(1)));
            }
            _ => return None,
        }
    }

    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
    Some(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(n: usize) -> Vec<Reference> {
        (1..=n)
            .map(|i| Reference {
                ref_id: i,
                uri: format!("evidence://uri{}", i),
                page_id: "p".into(),
                url: "https://a".into(),
                title: None,
                viewpoint: "v".into(),
                start_line: 1,
                end_line: 1,
                text: "t".into(),
            })
            .collect()
    }

    fn link(text: &str, n: usize) -> String {
        link_citations(text, &refs(n), &CitationConfig::default())
    }

    #[test]
    fn test_single_and_grouped_markers() {
        assert_eq!(
            link("See [1] and [2,3]", 3),
            "See [1](evidence://uri1) and [2](evidence://uri2), [3](evidence://uri3)"
        );
    }

    #[test]
    fn test_footnote_range_and_cjk_lists() {
        assert_eq!(link("a[^2]", 3), "a[2](evidence://uri2)");
        assert_eq!(link("[1-3]", 3), "[1](evidence://uri1), [2](evidence://uri2), [3](evidence://uri3)");
        assert_eq!(link("结论[1，2]。另见[3、1]", 3), "结论[1](evidence://uri1), [2](evidence://uri2)。另见[3](evidence://uri3), [1](evidence://uri1)");
    }

    #[test]
    fn test_unknown_ids_are_left_alone() {
        assert_eq!(link("see [7]", 3), "see [7]");
        assert_eq!(link("see [3, 7]", 3), "see [3](evidence://uri3), [7]");
    }

    #[test]
    fn test_range_expansion_is_capped() {
        let linked = link("[1-20]", 20);
        assert_eq!(linked.matches("](evidence://uri").count(), 8);
        assert!(linked.ends_with("[8](evidence://uri8)"));
    }

    #[test]
    fn test_descending_range_is_untouched() {
        assert_eq!(link("[3-1]", 3), "[3-1]");
    }

    #[test]
    fn test_linking_is_idempotent() {
        let once = link("See [1] and [2,3] but not [9]", 3);
        assert_eq!(link(&once, 3), once);
    }

    #[test]
    fn test_plain_parenthetical_after_marker_is_kept() {
        assert_eq!(link("[1](2020)", 3), "[1](evidence://uri1)(2020)");
    }

    #[test]
    fn test_non_citation_brackets_are_ignored() {
        assert_eq!(link("array[i] and [note]", 3), "array[i] and [note]");
    }
}
