/// Strip a single leading `/` from a caller supplied path.
pub fn strip_leading_separator(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Reverse the `/`-separated segments of a path: `a/b/c` becomes `c/b/a`.
///
/// Two paths share a reverse-key prefix of `k` segments exactly when their trailing `k`
/// segments are identical, which turns suffix matching into an ordered range query.
pub fn reverse_key(path: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').collect();
    segments.reverse();
    segments.join("/")
}

/// Whether `key` begins with the segments of `query` on a segment boundary.
pub fn key_matches(key: &str, query: &str) -> bool {
    match key.strip_prefix(query) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverses_segments() {
        assert_eq!(reverse_key("a/b/c"), "c/b/a");
        assert_eq!(reverse_key("single.js"), "single.js");
    }

    #[test]
    fn strips_only_one_separator() {
        assert_eq!(strip_leading_separator("/a/b"), "a/b");
        assert_eq!(strip_leading_separator("//a"), "/a");
        assert_eq!(strip_leading_separator("a"), "a");
    }

    #[test]
    fn matches_on_segment_boundaries() {
        assert!(key_matches("app.js/js/1.0/app", "app.js/js"));
        assert!(key_matches("app.js", "app.js"));
        assert!(!key_matches("app.jsx/js", "app.js"));
        assert!(!key_matches("app.js/jsx/1.0", "app.js/js"));
    }
}
