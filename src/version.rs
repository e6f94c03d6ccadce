//! Version lookup for a single module, memoized across callers.
//!
//! Versions normally come straight from the directory layout (see
//! [`crate::registry::infer_version`]). A [`VersionResolver`] additionally consults declared
//! versions, either pre-registered overrides or [`VersionSource`]s such as packaged
//! descriptors, and normalizes them against the version directories that actually exist.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::asset_paths::{module_prefix, strip_leading_separator, version_candidates};
use crate::enumerator::ResourceEnumerator;
use crate::index::PathIndex;
use crate::manifest::parse_properties_version;
use crate::models::DeclaredVersion;
use crate::registry::infer_version;

/// Separator between a version and its qualifier in declared version strings.
pub const DEFAULT_VERSION_SEPARATOR: char = '-';

/// External record of the version a module claims to have.
pub trait VersionSource: Send + Sync {
  /// Declared version of `module`, if this source knows about it.
  fn declared_version(&self, module: &str) -> Option<DeclaredVersion>;
}

/// Memoized module versions.
///
/// Lookups for a missing key are computed inside the map's entry lock, so two callers racing
/// on the first lookup of a module observe the same stored value.
#[derive(Debug, Default)]
pub struct VersionCache {
  entries: DashMap<String, Option<String>>,
}

impl VersionCache {
  /// Empty cache.
  pub fn new() -> Self {
    Self::default()
  }

  /// Memoized version of `module`, if it was computed or seeded before.
  pub fn get(&self, module: &str) -> Option<Option<String>> {
    self.entries.get(module).map(|value| value.value().clone())
  }

  /// Return the stored version of `module`, running `compute` only when nothing is stored.
  pub fn get_or_compute<F>(&self, module: &str, compute: F) -> Option<String>
  where
    F: FnOnce() -> Option<String>,
  {
    if let Some(value) = self.entries.get(module) {
      return value.value().clone();
    }
    self
      .entries
      .entry(module.to_string())
      .or_insert_with(compute)
      .value()
      .clone()
  }

  /// Store `version` for `module` unless a value is already present.
  ///
  /// Returns whether the value was stored.
  pub fn seed(&self, module: &str, version: Option<String>) -> bool {
    match self.entries.entry(module.to_string()) {
      Entry::Occupied(_) => false,
      Entry::Vacant(slot) => {
        slot.insert(version);
        true
      }
    }
  }

  /// Number of memoized modules.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Whether nothing has been memoized yet.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// Resolves module versions against an index, memoizing every answer.
pub struct VersionResolver {
  index: Arc<PathIndex>,
  sources: Vec<Box<dyn VersionSource>>,
  cache: Arc<VersionCache>,
  separator: char,
}

impl VersionResolver {
  /// Resolver over `index` with a fresh cache and no declared-version sources.
  pub fn new(index: Arc<PathIndex>) -> Self {
    Self {
      index,
      sources: Vec::new(),
      cache: Arc::new(VersionCache::new()),
      separator: DEFAULT_VERSION_SEPARATOR,
    }
  }

  /// Share `cache` with other resolvers instead of the private one.
  pub fn with_cache(mut self, cache: Arc<VersionCache>) -> Self {
    self.cache = cache;
    self
  }

  /// Consult `source` after the sources registered before it.
  pub fn with_source(mut self, source: impl VersionSource + 'static) -> Self {
    self.sources.push(Box::new(source));
    self
  }

  /// Use `separator` to split qualifiers off declared versions.
  pub fn with_separator(mut self, separator: char) -> Self {
    self.separator = separator;
    self
  }

  /// Memoized versions, shared with every clone of the `Arc`.
  pub fn cache(&self) -> &Arc<VersionCache> {
    &self.cache
  }

  /// Pre-load declared versions, returning how many were accepted.
  ///
  /// A record is kept only when `<root>/<module>/<version>/` exists in the index, and only
  /// when no version is stored for the module yet, so the first registration wins.
  pub fn register_overrides<I>(&self, records: I) -> usize
  where
    I: IntoIterator<Item = DeclaredVersion>,
  {
    let mut accepted = 0;
    for record in records {
      if !self.has_version_dir(&record.module, &record.version) {
        debug!(
          module = %record.module,
          version = %record.version,
          "dropping version override without a matching directory"
        );
        continue;
      }
      if self.cache.seed(&record.module, Some(record.version.clone())) {
        accepted += 1;
      } else {
        debug!(module = %record.module, "module already has a registered version");
      }
    }
    accepted
  }

  /// Version of `module`, or `None` for unknown and flat-layout modules.
  pub fn version(&self, module: &str) -> Option<String> {
    let module = module.trim();
    if module.is_empty() {
      return None;
    }
    self
      .cache
      .get_or_compute(module, || self.compute_version(module))
  }

  /// Full path of `relative` inside `module`, when that exact resource is indexed.
  ///
  /// `relative` may already start with the version segment; it is not repeated.
  pub fn full_path(&self, module: &str, relative: &str) -> Option<String> {
    exact_path(&self.index, module, self.version(module).as_deref(), relative)
  }

  /// Whether `<root>/<module>/<version>/` holds any indexed resource.
  pub fn has_version_dir(&self, module: &str, version: &str) -> bool {
    if module.is_empty() || version.is_empty() {
      return false;
    }
    let prefix = format!("{}{}/", module_prefix(self.index.root(), module), version);
    self.index.has_prefix(&prefix)
  }

  fn compute_version(&self, module: &str) -> Option<String> {
    for source in &self.sources {
      let Some(declared) = source.declared_version(module) else {
        continue;
      };
      let found = version_candidates(&declared.version, self.separator)
        .into_iter()
        .find(|candidate| self.has_version_dir(module, candidate));
      match found {
        Some(version) => return Some(version),
        None => debug!(
          module,
          declared = %declared.version,
          "declared version has no matching directory"
        ),
      }
    }

    let prefix = module_prefix(self.index.root(), module);
    let contents: BTreeSet<String> = self.index.list_under_prefix(&prefix).into_iter().collect();
    infer_version(self.index.root(), module, &contents)
  }
}

impl std::fmt::Debug for VersionResolver {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("VersionResolver")
      .field("root", &self.index.root())
      .field("sources", &self.sources.len())
      .field("cached", &self.cache.len())
      .field("separator", &self.separator)
      .finish()
  }
}

/// Full path of `relative` inside `module` at `version`, when that exact resource is indexed.
pub(crate) fn exact_path(
  index: &PathIndex,
  module: &str,
  version: Option<&str>,
  relative: &str,
) -> Option<String> {
  let relative = strip_leading_separator(relative);
  if relative.is_empty() {
    return None;
  }
  let prefix = module_prefix(index.root(), module);
  let candidate = match version {
    Some(version) if !starts_with_segment(relative, version) => {
      format!("{}{}/{}", prefix, version, relative)
    }
    _ => format!("{}{}", prefix, relative),
  };
  index.contains(&candidate).then_some(candidate)
}

fn starts_with_segment(relative: &str, segment: &str) -> bool {
  relative
    .strip_prefix(segment)
    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Declared versions read from packaged `pom.properties` descriptors.
///
/// Descriptors live at `<descriptor_root>/<group>/<module>/<file_name>`; groups are tried in
/// order and the first descriptor found wins.
pub struct DescriptorVersionSource {
  enumerator: Arc<dyn ResourceEnumerator>,
  descriptor_root: String,
  groups: Vec<String>,
  file_name: String,
}

impl DescriptorVersionSource {
  /// Source reading descriptors through `enumerator`.
  pub fn new(
    enumerator: Arc<dyn ResourceEnumerator>,
    descriptor_root: impl Into<String>,
    groups: Vec<String>,
    file_name: impl Into<String>,
  ) -> Self {
    Self {
      enumerator,
      descriptor_root: descriptor_root.into().trim_end_matches('/').to_string(),
      groups,
      file_name: file_name.into(),
    }
  }

  fn read_descriptor(&self, group: &str, module: &str) -> Option<String> {
    let folder = format!("{}/{}/{}", self.descriptor_root, group, module);
    let target = format!("{}/{}", folder, self.file_name);
    let resources = match self.enumerator.enumerate(&folder, &|path| path == target) {
      Ok(resources) => resources,
      Err(err) => {
        debug!(%folder, error = %err, "failed to list descriptors");
        return None;
      }
    };
    let resource = resources.first()?;
    match self.enumerator.read(resource) {
      Ok(bytes) => parse_properties_version(&String::from_utf8_lossy(&bytes)),
      Err(err) => {
        debug!(path = %resource.path, error = %err, "failed to read descriptor");
        None
      }
    }
  }
}

impl VersionSource for DescriptorVersionSource {
  fn declared_version(&self, module: &str) -> Option<DeclaredVersion> {
    self.groups.iter().find_map(|group| {
      let version = self.read_descriptor(group, module)?;
      Some(DeclaredVersion {
        module: module.to_string(),
        version,
        group: Some(group.clone()),
      })
    })
  }
}

impl std::fmt::Debug for DescriptorVersionSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DescriptorVersionSource")
      .field("descriptor_root", &self.descriptor_root)
      .field("groups", &self.groups)
      .field("file_name", &self.file_name)
      .finish()
  }
}
