//! Numbered page lines and the read-only tools the extraction agent
//! uses to explore them.

use regex::RegexBuilder;

use crate::types::config::ExtractAgentConfig;

/// Page text addressed by 1-based line numbers.
#[derive(Debug, Clone)]
pub struct NumberedDocument {
    lines: Vec<String>,
    chars: usize,
}

/// Options for one `grep` call.
#[derive(Debug, Clone, Default)]
pub struct GrepOptions<'a> {
    pub pattern: &'a str,
    pub flags: Option<&'a str>,
    pub context_before: usize,
    pub context_after: usize,
    pub max_matches: Option<usize>,
}

impl NumberedDocument {
    /// Wrap page lines.
    pub fn new(lines: Vec<String>) -> Self {
        let chars = lines.iter().map(|l| l.chars().count()).sum::<usize>() + lines.len().saturating_sub(1);
        Self { lines, chars }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn char_count(&self) -> usize {
        self.chars
    }

    /// Whether the page is too large to show up front.
    pub fn is_large(&self, config: &ExtractAgentConfig) -> bool {
        self.lines.len() > config.large_line_threshold || self.chars > config.large_char_threshold
    }

    /// Lines shown in the first message: everything, or a preview.
    pub fn initial_view(&self, config: &ExtractAgentConfig) -> (String, usize) {
        let shown = if self.is_large(config) {
            config.preview_lines.min(self.lines.len())
        } else {
            self.lines.len()
        };
        (self.render(1, shown), shown)
    }

    /// Render an inclusive range as `  12| text` lines.
    fn render(&self, start: usize, end: usize) -> String {
        if start == 0 || end < start || start > self.lines.len() {
            return String::new();
        }
        let end = end.min(self.lines.len());
        let width = end.to_string().len();
        (start..=end)
            .map(|n| format!("{:>width$}| {}", n, self.lines[n - 1], width = width))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `read_lines(start, end)`. Spans are capped at `max_span` lines.
    pub fn read_lines(&self, start: usize, end: usize, max_span: usize) -> Result<String, String> {
        let total = self.lines.len();
        if start == 0 || start > total {
            return Err(format!("start must be between 1 and {}", total));
        }
        if end < start {
            return Err(format!("end ({}) must not be before start ({})", end, start));
        }
        let capped_end = end.min(total).min(start + max_span.max(1) - 1);
        let mut text = self.render(start, capped_end);
        if capped_end < end.min(total) {
            text.push_str(&format!(
                "\n[truncated at line {}; request the rest separately]",
                capped_end
            ));
        }
        Ok(text)
    }

    /// `grep(pattern, flags, context)`: matching lines with context,
    /// grouped into blocks separated by `--`.
    pub fn grep(&self, options: &GrepOptions<'_>, config: &ExtractAgentConfig) -> Result<String, String> {
        let flags = options.flags.unwrap_or("");
        let literal = flags.contains('F');
        let pattern = if literal {
            regex::escape(options.pattern)
        } else {
            options.pattern.to_string()
        };
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(flags.contains('i'))
            .size_limit(1 << 20)
            .build()
            .map_err(|e| format!("invalid pattern: {}", e))?;

        let limit = options
            .max_matches
            .unwrap_or(config.grep_default_max_matches)
            .clamp(1, config.grep_hard_max_matches);

        let matches: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| re.is_match(line))
            .map(|(i, _)| i + 1)
            .collect();

        if matches.is_empty() {
            return Ok("no matches".to_string());
        }

        let total_matches = matches.len();
        let mut blocks: Vec<(usize, usize)> = Vec::new();
        for line in matches.into_iter().take(limit) {
            let start = line.saturating_sub(options.context_before).max(1);
            let end = line.saturating_add(options.context_after).min(self.lines.len());
            match blocks.last_mut() {
                Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
                _ => blocks.push((start, end)),
            }
        }

        let mut out = blocks
            .iter()
            .map(|(s, e)| self.render(*s, *e))
            .collect::<Vec<_>>()
            .join("\n--\n");
        if total_matches > limit {
            out.push_str(&format!(
                "\n[{} of {} matches shown]",
                limit, total_matches
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(n: usize) -> NumberedDocument {
        NumberedDocument::new((1..=n).map(|i| format!("line {}", i)).collect())
    }

    #[test]
    fn test_read_lines_renders_numbers() {
        let text = doc(12).read_lines(9, 10, 300).unwrap();
        assert_eq!(text, " 9| line 9\n10| line 10");
    }

    #[test]
    fn test_read_lines_rejects_out_of_range() {
        assert!(doc(3).read_lines(0, 1, 300).is_err());
        assert!(doc(3).read_lines(4, 5, 300).is_err());
        assert!(doc(3).read_lines(3, 2, 300).is_err());
    }

    #[test]
    fn test_read_lines_caps_span() {
        let text = doc(50).read_lines(1, 50, 5).unwrap();
        assert!(text.contains("5| line 5"));
        assert!(!text.contains("line 6"));
        assert!(text.ends_with("[truncated at line 5; request the rest separately]"));
    }

    #[test]
    fn test_grep_merges_context_blocks() {
        let document = doc(20);
        let config = ExtractAgentConfig::default();
        let out = document
            .grep(
                &GrepOptions {
                    pattern: "line (3|4)$",
                    context_before: 1,
                    context_after: 1,
                    ..Default::default()
                },
                &config,
            )
            .unwrap();
        assert_eq!(out, "2| line 2\n3| line 3\n4| line 4\n5| line 5");
    }

    #[test]
    fn test_grep_context_saturates_at_page_end() {
        let document = NumberedDocument::new(vec!["a".into(), "b".into()]);
        let out = document
            .grep(
                &GrepOptions {
                    pattern: "a",
                    context_after: usize::MAX,
                    ..Default::default()
                },
                &ExtractAgentConfig::default(),
            )
            .unwrap();
        assert_eq!(out, "1| a\n2| b");
    }

    #[test]
    fn test_grep_flags_and_limits() {
        let document = NumberedDocument::new(vec!["Price: $5".into(), "price (tax)".into(), "none".into()]);
        let config = ExtractAgentConfig::default();

        let literal = document
            .grep(
                &GrepOptions {
                    pattern: "(tax)",
                    flags: Some("F"),
                    ..Default::default()
                },
                &config,
            )
            .unwrap();
        assert_eq!(literal, "2| price (tax)");

        let limited = document
            .grep(
                &GrepOptions {
                    pattern: "price",
                    flags: Some("i"),
                    max_matches: Some(1),
                    ..Default::default()
                },
                &config,
            )
            .unwrap();
        assert!(limited.starts_with("1| Price: $5"));
        assert!(limited.ends_with("[1 of 2 matches shown]"));

        assert!(document
            .grep(&GrepOptions { pattern: "(", ..Default::default() }, &config)
            .is_err());
    }

    #[test]
    fn test_large_document_gets_preview() {
        let config = ExtractAgentConfig {
            large_line_threshold: 10,
            preview_lines: 3,
            ..Default::default()
        };
        let (view, shown) = doc(11).initial_view(&config);
        assert_eq!(shown, 3);
        assert!(view.ends_with("3| line 3"));

        let (_, shown) = doc(10).initial_view(&config);
        assert_eq!(shown, 10);
    }
}
