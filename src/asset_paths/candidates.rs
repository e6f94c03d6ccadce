use std::collections::BTreeSet;

/// Generate normalised candidates for a declared version string.
///
/// Declared versions do not always match the directory they are published under, typically
/// because of a pre-release or build qualifier (`2.1.0-1`, `1.0.0-rc.2-build`). The generator
/// expands the value into a small deterministic list: the value itself, then both halves around
/// the first separator, then both halves around the last one. Callers accept the first
/// candidate that names an existing resource directory.
pub fn version_candidates(version: &str, separator: char) -> Vec<String> {
    if version.trim().is_empty() {
        return Vec::new();
    }

    let mut builder = CandidateBuilder::new(version.trim());
    builder.add_original();
    builder.add_split(version.trim().split_once(separator));
    builder.add_split(version.trim().rsplit_once(separator));
    builder.finish()
}

struct CandidateBuilder<'a> {
    original: &'a str,
    seen: BTreeSet<String>,
    result: Vec<String>,
}

impl<'a> CandidateBuilder<'a> {
    fn new(original: &'a str) -> Self {
        Self {
            original,
            seen: BTreeSet::new(),
            result: Vec::new(),
        }
    }

    fn add_original(&mut self) {
        self.push(self.original.to_string());
    }

    fn add_split(&mut self, halves: Option<(&str, &str)>) {
        let Some((prefix, suffix)) = halves else {
            return;
        };
        self.push(prefix.to_string());
        self.push(suffix.to_string());
    }

    fn finish(self) -> Vec<String> {
        self.result
    }

    fn push(&mut self, candidate: String) {
        if candidate.is_empty() {
            return;
        }
        if self.seen.insert(candidate.clone()) {
            self.result.push(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::version_candidates;

    #[test]
    fn returns_empty_for_blank_versions() {
        assert!(version_candidates("", '-').is_empty());
        assert!(version_candidates("   ", '-').is_empty());
    }

    #[test]
    fn keeps_plain_versions_untouched() {
        assert_eq!(version_candidates("3.1.1", '-'), vec!["3.1.1".to_string()]);
    }

    #[test]
    fn splits_around_a_single_separator() {
        assert_eq!(version_candidates("2.1.0-1", '-'), vec![
            "2.1.0-1".to_string(),
            "2.1.0".to_string(),
            "1".to_string(),
        ]);
    }

    #[test]
    fn tries_first_and_last_separator_for_multiple_qualifiers() {
        assert_eq!(version_candidates("1.0.0-rc.2-build", '-'), vec![
            "1.0.0-rc.2-build".to_string(),
            "1.0.0".to_string(),
            "rc.2-build".to_string(),
            "1.0.0-rc.2".to_string(),
            "build".to_string(),
        ]);
    }

    #[test]
    fn drops_empty_halves() {
        assert_eq!(version_candidates("-snapshot", '-'), vec![
            "-snapshot".to_string(),
            "snapshot".to_string(),
        ]);
    }
}
