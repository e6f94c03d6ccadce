//! Reverse-key path index answering partial-path lookups.
//!
//! Partial paths name a suffix of a full resource path (`js/app.js` should find
//! `root/app/1.0/js/app.js`). Reversing the segments turns that suffix into a prefix, so an
//! ordered map answers the query with a single range scan instead of testing every path.

use std::collections::{BTreeMap, BTreeSet};

use crate::asset_paths::{key_matches, reverse_key, strip_leading_separator};
use crate::error::{LookupError, LookupResult};

/// Immutable index over a snapshot of resource paths.
///
/// Built once and never mutated, so it can be shared between threads and queried without
/// locking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathIndex {
  root: String,
  by_reverse: BTreeMap<String, String>,
  paths: BTreeSet<String>,
}

impl PathIndex {
  /// Index `paths` found under the namespace `root`. Duplicate paths collapse into one entry.
  pub fn build<I, S>(root: impl Into<String>, paths: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let paths: BTreeSet<String> = paths.into_iter().map(Into::into).collect();
    let by_reverse = paths
      .iter()
      .map(|path| (reverse_key(path), path.clone()))
      .collect();

    Self {
      root: root.into().trim_end_matches('/').to_string(),
      by_reverse,
      paths,
    }
  }

  /// Namespace root the index was built for, without a trailing slash.
  pub fn root(&self) -> &str {
    &self.root
  }

  /// Number of distinct indexed paths.
  pub fn len(&self) -> usize {
    self.paths.len()
  }

  /// Whether the index holds no paths.
  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }

  /// Indexed paths in ascending order.
  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.paths.iter().map(String::as_str)
  }

  /// Whether `path` is indexed verbatim.
  pub fn contains(&self, path: &str) -> bool {
    self.paths.contains(path)
  }

  /// Whether any indexed path starts with `prefix`.
  pub fn has_prefix(&self, prefix: &str) -> bool {
    self
      .paths
      .range(prefix.to_string()..)
      .next()
      .is_some_and(|path| path.starts_with(prefix))
  }

  /// Resolve a partial path to the single full path it denotes.
  pub fn resolve(&self, partial: &str) -> LookupResult<String> {
    self.resolve_where(partial, |_| true)
  }

  /// Resolve a partial path, considering only full paths accepted by `accept`.
  pub fn resolve_where<F>(&self, partial: &str, accept: F) -> LookupResult<String>
  where
    F: Fn(&str) -> bool,
  {
    let trimmed = strip_leading_separator(partial);
    if trimmed.is_empty() {
      return Err(LookupError::not_found(partial));
    }

    let query = reverse_key(trimmed);
    let mut matches: Vec<String> = self
      .by_reverse
      .range(query.clone()..)
      .take_while(|(key, _)| key.starts_with(&query))
      .filter(|(key, path)| key_matches(key.as_str(), &query) && accept(path.as_str()))
      .map(|(_, path)| path.clone())
      .collect();

    match matches.len() {
      0 => Err(LookupError::not_found(partial)),
      1 => Ok(matches.remove(0)),
      _ => Err(LookupError::MultipleMatches {
        path: partial.to_string(),
        matches,
      }),
    }
  }

  /// Every indexed path starting with `prefix`, or with `<root>/<prefix>`.
  ///
  /// The second form lets callers pass bare module-relative folders such as `multiple/1.0.0`
  /// or `/multiple/1.0.0`. Matching is case-sensitive; results are in ascending order.
  pub fn list_under_prefix(&self, prefix: &str) -> Vec<String> {
    let rooted = if prefix.starts_with('/') {
      format!("{}{}", self.root, prefix)
    } else {
      format!("{}/{}", self.root, prefix)
    };

    let mut listed: BTreeSet<&String> = self.with_prefix(prefix).collect();
    listed.extend(self.with_prefix(&rooted));
    listed.into_iter().cloned().collect()
  }

  fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a String> + 'a {
    self
      .paths
      .range(prefix.to_string()..)
      .take_while(move |path| path.starts_with(prefix))
  }
}
