//! Data structures shared between the index, the registry and the extractor.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One file reported by a [`crate::enumerator::ResourceEnumerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratedResource {
  /// Full resource path relative to the global root, always `/`-separated.
  pub path: String,
  /// Stable identifier of the directory or archive the resource was found in.
  pub origin: String,
  /// Last modification time in epoch milliseconds, when the origin records one.
  pub last_modified: Option<i64>,
  /// POSIX permission bits, when the origin records them.
  pub mode: Option<u32>,
}

impl EnumeratedResource {
  /// Identity of the physical source used for change detection.
  ///
  /// Directory origins resolve to the absolute file path; archive origins use the
  /// `archive!/entry` form so entries of one archive stay distinguishable.
  pub fn source_identity(&self) -> String {
    if self.origin.starts_with("dir:") {
      let base = self.origin.trim_start_matches("dir:").trim_end_matches('/');
      format!("{}/{}", base, self.path)
    } else {
      format!("{}!/{}", self.origin, self.path)
    }
  }
}

/// Change-detection record for one extracted file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheEntry {
  /// Identity of the source the file was copied from.
  pub source: String,
  /// Modification time of the source in epoch milliseconds.
  pub last_modified: i64,
}

impl CacheEntry {
  /// Build a record from its parts.
  pub fn new(source: impl Into<String>, last_modified: i64) -> Self {
    Self {
      source: source.into(),
      last_modified,
    }
  }
}

/// Everything known about one module after the registry pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
  /// Module name: the first segment below the namespace root.
  pub name: String,
  /// Version segment shared by every resource, if one could be established.
  pub version: Option<String>,
  /// Origin of the first resource seen for this module.
  pub origin: String,
  /// Every indexed resource path belonging to the module.
  pub contents: BTreeSet<String>,
  /// Publishing group declared by the module's descriptor, if any.
  pub group: Option<String>,
}

/// Version declared for a module by an override record or a packaged descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeclaredVersion {
  /// Module the declaration applies to.
  pub module: String,
  /// Declared version string, possibly carrying a qualifier.
  pub version: String,
  /// Publishing group, when the declaration carries one.
  #[serde(default)]
  pub group: Option<String>,
}

impl DeclaredVersion {
  /// Declaration without a group.
  pub fn new(module: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      module: module.into(),
      version: version.into(),
      group: None,
    }
  }
}
