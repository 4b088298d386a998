//! Line selections and range arithmetic.
//!
//! All line numbers are 1-based and ranges are inclusive on both ends.

use serde::{Deserialize, Serialize};

/// An inclusive, 1-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    /// Build a range, rejecting `start == 0` and `end < start`.
    pub fn new(start: usize, end: usize) -> Option<Self> {
        (start >= 1 && end >= start).then_some(Self { start, end })
    }

    /// Intersection of two ranges, or `None` when they are disjoint.
    ///
    /// `overlap(a, b) == overlap(b, a)` for all inputs.
    pub fn overlap(&self, other: &LineRange) -> Option<LineRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (end >= start).then_some(LineRange { start, end })
    }

    /// Whether `other` lies entirely inside this range.
    pub fn contains(&self, other: &LineRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Number of lines covered.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Ranges are never empty once constructed.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `start:end` key used for deduplication.
    pub fn key(&self) -> String {
        format!("{}:{}", self.start, self.end)
    }
}

impl std::fmt::Display for LineRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// A line range plus the exact text it spans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSelection {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl LineSelection {
    /// Create a selection with its text.
    pub fn new(start: usize, end: usize, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Cut a selection out of page lines. Returns `None` when the range
    /// falls outside the page; an `end` past the last line is clamped.
    pub fn from_lines(lines: &[String], start: usize, end: usize) -> Option<Self> {
        if start == 0 || start > lines.len() || end < start {
            return None;
        }
        let end = end.min(lines.len());
        Some(Self {
            start,
            end,
            text: lines[start - 1..end].join("\n"),
        })
    }

    /// The range part of this selection, if well-formed.
    pub fn range(&self) -> Option<LineRange> {
        LineRange::new(self.start, self.end)
    }

    /// Narrow this selection's text down to `target`, which must be
    /// contained in the selection's own range.
    ///
    /// Returns `None` if the stored text does not have one line per
    /// covered line number.
    pub fn slice(&self, target: &LineRange) -> Option<String> {
        let own = self.range()?;
        if !own.contains(target) {
            return None;
        }
        let lines: Vec<&str> = self.text.split('\n').collect();
        if lines.len() != own.len() {
            return None;
        }
        let from = target.start - own.start;
        let to = target.end - own.start;
        Some(lines[from..=to].join("\n"))
    }

    /// `start:end:text` key used when unioning selections.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}:{}", self.start, self.end, self.text)
    }
}

/// Sort selections ascending by start, then end.
pub fn sort_selections(selections: &mut [LineSelection]) {
    selections.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
}

/// Compact human-readable list of ranges, e.g. `3-5, 9`.
pub fn describe_ranges<'a>(ranges: impl IntoIterator<Item = &'a LineRange>) -> String {
    ranges
        .into_iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
