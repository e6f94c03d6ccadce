//! Client-facing lookup errors.

use thiserror::Error;

/// Failure to resolve a partial or exact path to a single indexed resource.
///
/// Both variants carry the path exactly as the caller supplied it so the message can name it;
/// ambiguity additionally carries every candidate so callers can branch on the set instead of
/// parsing the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
  /// Nothing in the index (or in the named module) matches the path.
  #[error(
    "{path} could not be found. Make sure you've added the corresponding module and please check for typos."
  )]
  NotFound {
    /// Path or module name that was queried.
    path: String,
  },
  /// More than one full path matches the query.
  #[error(
    "Multiple matches found for {path}. Please provide a more specific path, for example by including a version number."
  )]
  MultipleMatches {
    /// Path that was queried.
    path: String,
    /// Every matching full path, in reverse-key order.
    matches: Vec<String>,
  },
}

impl LookupError {
  pub(crate) fn not_found(path: impl Into<String>) -> Self {
    Self::NotFound { path: path.into() }
  }

  /// Candidate paths for an ambiguous lookup; empty for [`LookupError::NotFound`].
  pub fn matches(&self) -> &[String] {
    match self {
      Self::NotFound { .. } => &[],
      Self::MultipleMatches { matches, .. } => matches,
    }
  }
}

/// Result alias for path lookups.
pub type LookupResult<T> = Result<T, LookupError>;
