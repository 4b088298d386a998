//! Normalization used for cache keys, guard keys and dedup keys.

use url::Url;

/// Collapse runs of whitespace to one space, trim, and lowercase.
///
/// Used for queries (cache key, repeat guard) and viewpoints (dedup key).
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonical form of a URL for lookups.
///
/// Lowercases scheme and host (the `url` crate does this on parse), drops
/// the fragment and a trailing `/` on non-root paths. Unparseable input is
/// returned trimmed.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    url.set_fragment(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Rust   ASYNC\n runtimes "), "rust async runtimes");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM/Docs/#intro"),
            "https://example.com/Docs"
        );
        assert_eq!(normalize_url("https://example.com/"), "https://example.com/");
        assert_eq!(normalize_url("https://x"), "https://x/");
        assert_eq!(normalize_url("  not a url "), "not a url");
    }
}
