use regex::Regex;

fn archive_entry_ignores() -> &'static [Regex] {
    use std::sync::OnceLock;

    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                Regex::new(r"(^|/)__MACOSX/").expect("invalid macOS metadata regex"),
                Regex::new(r"(^|/)\.DS_Store$").expect("invalid DS_Store regex"),
                Regex::new(r"(?i)(^|/)Thumbs\.db$").expect("invalid Thumbs.db regex"),
            ]
        })
        .as_slice()
}

/// Determine whether an enumerated entry is platform metadata rather than a bundle resource.
///
/// Archives built on desktop machines regularly carry Finder and Explorer droppings; they are
/// never part of a module and would otherwise show up as ambiguous partial-path matches.
pub fn should_ignore_entry(path: &str) -> bool {
    archive_entry_ignores()
        .iter()
        .any(|pattern| pattern.is_match(path))
}
