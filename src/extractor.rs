//! Incremental extraction of module resources into a plain output directory.
//!
//! Every selected module is copied to `<output>/<folder>/<relative>`, where `folder` is the
//! module name (or the id declared by its manifest) and `relative` is the resource path with
//! the module and version segments removed. Files the cache reports as current are left alone.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use filetime::{FileTime, set_file_mtime};
use same_file::is_same_file;
use thiserror::Error;
use tracing::{error, info};

use crate::asset_paths::{is_enclosed_path, make_output_key, module_prefix};
use crate::cache::ExtractionCache;
use crate::enumerator::{EnumerationError, ResourceEnumerator, modified_millis};
use crate::locator::AssetLocator;
use crate::manifest::parse_manifest_id;
use crate::models::{CacheEntry, EnumeratedResource, ModuleInfo};
use crate::selection::{ModuleInclusion, ModuleSelection};

/// Manifest naming npm packages.
pub const PACKAGE_JSON: &str = "package.json";
/// Manifest naming bower components.
pub const BOWER_JSON: &str = "bower.json";

/// Failure to copy one resource.
#[derive(Debug, Error)]
pub enum CopyError {
  /// The resource bytes could not be read from their origin.
  #[error(transparent)]
  Read(EnumerationError),
  /// The destination could not be written.
  #[error("failed to write destination: {0}")]
  Write(#[from] io::Error),
  /// The output key would address a file outside the output root.
  #[error("refusing to write outside the output directory: {0}")]
  Escapes(String),
}

/// A resource that could not be extracted. Extraction carries on with the next file.
#[derive(Debug, Error)]
#[error("failed to extract {resource} to {}", destination.display())]
pub struct ExtractFailure {
  /// Full resource path.
  pub resource: String,
  /// Destination that was being written.
  pub destination: PathBuf,
  /// What went wrong.
  #[source]
  pub cause: CopyError,
}

/// Outcome of one extraction pass.
#[derive(Debug, Default)]
pub struct ExtractReport {
  /// Output keys of the files copied in this pass.
  pub copied: Vec<String>,
  /// Number of files left alone because the cache reported them current.
  pub up_to_date: usize,
  /// Modules skipped because the requested manifest declared no id.
  pub skipped_modules: Vec<String>,
  /// Files that could not be copied.
  pub failures: Vec<ExtractFailure>,
}

impl ExtractReport {
  /// Whether every selected file is now in place.
  pub fn is_success(&self) -> bool {
    self.failures.is_empty()
  }
}

/// Copies module resources out of an enumerator, consulting an [`ExtractionCache`].
pub struct Extractor<'a> {
  locator: &'a AssetLocator,
  enumerator: &'a dyn ResourceEnumerator,
  cache: &'a dyn ExtractionCache,
}

impl<'a> Extractor<'a> {
  /// Extractor for the modules known to `locator`, reading bytes through `enumerator`.
  pub fn new(
    locator: &'a AssetLocator,
    enumerator: &'a dyn ResourceEnumerator,
    cache: &'a dyn ExtractionCache,
  ) -> Self {
    Self {
      locator,
      enumerator,
      cache,
    }
  }

  /// Extract every selected module below `output_root`.
  ///
  /// With `manifest_file` set, each module is written to the folder named by the `name` field
  /// of that manifest, and modules without one are skipped entirely.
  pub fn extract(
    &self,
    selection: &impl ModuleInclusion,
    manifest_file: Option<&str>,
    output_root: &Path,
  ) -> Result<ExtractReport, EnumerationError> {
    let mut report = ExtractReport::default();

    for module in self.locator.registry().iter() {
      if !selection.is_included(&module.name) {
        continue;
      }
      self.extract_module(module, manifest_file, output_root, &mut report)?;
    }

    info!(
      copied = report.copied.len(),
      up_to_date = report.up_to_date,
      skipped = report.skipped_modules.len(),
      failed = report.failures.len(),
      output = %output_root.display(),
      "extraction finished"
    );
    Ok(report)
  }

  /// Extract every module under its own name.
  pub fn extract_all_to(&self, output_root: &Path) -> Result<ExtractReport, EnumerationError> {
    self.extract(&ModuleSelection::all(), None, output_root)
  }

  /// Extract a single module under its own name.
  pub fn extract_module_to(
    &self,
    module: &str,
    output_root: &Path,
  ) -> Result<ExtractReport, EnumerationError> {
    self.extract(&ModuleSelection::only([module]), None, output_root)
  }

  /// Extract every module declaring a `package.json`, named after the package.
  pub fn extract_node_modules_to(
    &self,
    output_root: &Path,
  ) -> Result<ExtractReport, EnumerationError> {
    self.extract(&ModuleSelection::all(), Some(PACKAGE_JSON), output_root)
  }

  /// Extract every module declaring a `bower.json`, named after the component.
  pub fn extract_bower_components_to(
    &self,
    output_root: &Path,
  ) -> Result<ExtractReport, EnumerationError> {
    self.extract(&ModuleSelection::all(), Some(BOWER_JSON), output_root)
  }

  /// Files below `output_root` extracted by the previous pass but not by this one.
  pub fn stale_files(&self, output_root: &Path) -> BTreeSet<PathBuf> {
    self.cache.stale_destinations(output_root)
  }

  fn extract_module(
    &self,
    module: &ModuleInfo,
    manifest_file: Option<&str>,
    output_root: &Path,
    report: &mut ExtractReport,
  ) -> Result<(), EnumerationError> {
    let mut strip = module_prefix(self.locator.root(), &module.name);
    if let Some(version) = &module.version {
      strip.push_str(version);
      strip.push('/');
    }

    let mut seen = BTreeSet::new();
    let resources: Vec<EnumeratedResource> = self
      .enumerator
      .enumerate(strip.trim_end_matches('/'), &|path| path.starts_with(strip.as_str()))?
      .into_iter()
      .filter(|resource| seen.insert(resource.path.clone()))
      .collect();

    let folder = match manifest_file {
      Some(file) => match self.manifest_id(&resources, &strip, file) {
        Some(id) => id,
        None => {
          info!(module = %module.name, manifest = file, "skipping module without a manifest id");
          report.skipped_modules.push(module.name.clone());
          return Ok(());
        }
      },
      None => module.name.clone(),
    };

    for resource in &resources {
      let Some(relative) = resource.path.strip_prefix(strip.as_str()) else {
        continue;
      };
      let key = make_output_key(&folder, relative);
      let destination = output_root.join(&key);
      if !is_enclosed_path(&key) {
        error!(resource = %resource.path, key = %key, "refusing to extract outside the output directory");
        report.failures.push(ExtractFailure {
          resource: resource.path.clone(),
          destination,
          cause: CopyError::Escapes(key),
        });
        continue;
      }
      let candidate = self.cache_entry(resource);

      if destination.exists() && self.cache.is_current(&key, &candidate) {
        report.up_to_date += 1;
        continue;
      }

      match self.copy_resource(resource, &destination) {
        Ok(()) => {
          self.cache.record(&key, candidate);
          report.copied.push(key);
        }
        Err(cause) => {
          error!(
            resource = %resource.path,
            destination = %destination.display(),
            error = %cause,
            "failed to extract resource"
          );
          report.failures.push(ExtractFailure {
            resource: resource.path.clone(),
            destination,
            cause,
          });
        }
      }
    }
    Ok(())
  }

  fn manifest_id(
    &self,
    resources: &[EnumeratedResource],
    strip: &str,
    file: &str,
  ) -> Option<String> {
    let path = format!("{}{}", strip, file.trim_start_matches('/'));
    let manifest = resources.iter().find(|resource| resource.path == path)?;
    match self.enumerator.read(manifest) {
      Ok(bytes) => parse_manifest_id(&bytes),
      Err(err) => {
        error!(manifest = %path, error = %err, "failed to read manifest");
        None
      }
    }
  }

  fn cache_entry(&self, resource: &EnumeratedResource) -> CacheEntry {
    let local = self.enumerator.local_path(resource);
    let source = local
      .as_deref()
      .map(|path| path.to_string_lossy().replace('\\', "/"))
      .unwrap_or_else(|| resource.source_identity());
    let last_modified = resource
      .last_modified
      .or_else(|| {
        let metadata = fs::metadata(local.as_deref()?).ok()?;
        modified_millis(&metadata)
      })
      .unwrap_or(0);
    CacheEntry::new(source, last_modified)
  }

  fn copy_resource(
    &self,
    resource: &EnumeratedResource,
    destination: &Path,
  ) -> Result<(), CopyError> {
    if let Some(source) = self.enumerator.local_path(resource) {
      if destination.exists() && is_same_file(&source, destination)? {
        return Ok(());
      }
    }

    let bytes = self.enumerator.read(resource).map_err(CopyError::Read)?;
    if let Some(parent) = destination.parent() {
      fs::create_dir_all(parent)?;
    }
    if destination.exists() {
      fs::remove_file(destination)?;
    }
    fs::write(destination, bytes)?;

    if let Some(mode) = resource.mode {
      apply_permissions(destination, mode)?;
    }
    if let Some(millis) = resource.last_modified.filter(|millis| *millis > 0) {
      set_file_mtime(destination, file_time(millis))?;
    }
    Ok(())
  }
}

/// Delete the given stale files, then every directory they leave empty up to `output_root`.
///
/// Returns how many files were removed. Paths outside `output_root` are ignored.
pub fn prune_stale(output_root: &Path, stale: &BTreeSet<PathBuf>) -> io::Result<usize> {
  let root = fs::canonicalize(output_root).unwrap_or_else(|_| output_root.to_path_buf());
  let mut removed = 0;

  for path in stale {
    if !path.starts_with(&root) || path == &root {
      continue;
    }
    match fs::remove_file(path) {
      Ok(()) => removed += 1,
      Err(err) if err.kind() == ErrorKind::NotFound => {}
      Err(err) => return Err(err),
    }

    let mut parent = path.parent();
    while let Some(dir) = parent.filter(|dir| *dir != root && dir.starts_with(&root)) {
      match fs::read_dir(dir) {
        Ok(mut entries) => {
          if entries.next().is_some() {
            break;
          }
          fs::remove_dir(dir)?;
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err),
      }
      parent = dir.parent();
    }
  }
  Ok(removed)
}

fn file_time(millis: i64) -> FileTime {
  let seconds = millis.div_euclid(1000);
  let nanos = (millis.rem_euclid(1000) * 1_000_000) as u32;
  FileTime::from_unix_time(seconds, nanos)
}

#[cfg(unix)]
fn apply_permissions(path: &Path, mode: u32) -> io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn apply_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;
  use crate::cache::FileSystemCache;
  use crate::config::LocatorConfig;
  use crate::enumerator::{MemoryFile, MemoryOrigin};
  use tempfile::tempdir;

  const ROOT: &str = "META-INF/resources/webjars";

  /// Counts reads and can be told to fail one path.
  struct Spy {
    inner: MemoryOrigin,
    reads: AtomicUsize,
    failing: Option<String>,
  }

  impl Spy {
    fn new(inner: MemoryOrigin) -> Self {
      Self {
        inner,
        reads: AtomicUsize::new(0),
        failing: None,
      }
    }

    fn reads(&self) -> usize {
      self.reads.swap(0, Ordering::SeqCst)
    }
  }

  impl ResourceEnumerator for Spy {
    fn enumerate(
      &self,
      root: &str,
      filter: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<EnumeratedResource>, EnumerationError> {
      self.inner.enumerate(root, filter)
    }

    fn read(&self, resource: &EnumeratedResource) -> Result<Vec<u8>, EnumerationError> {
      self.reads.fetch_add(1, Ordering::SeqCst);
      if self.failing.as_deref() == Some(resource.path.as_str()) {
        return Err(EnumerationError::MissingResource {
          origin: resource.origin.clone(),
          path: resource.path.clone(),
        });
      }
      self.inner.read(resource)
    }
  }

  fn file(bytes: &[u8], last_modified: i64) -> MemoryFile {
    MemoryFile {
      bytes: bytes.to_vec(),
      last_modified: Some(last_modified),
      mode: Some(0o640),
    }
  }

  fn bundles() -> MemoryOrigin {
    let mut origin = MemoryOrigin::new("bundles");
    origin.insert(format!("{ROOT}/a/1.0/a.js"), file(b"a", 1_700_000_000_000));
    origin.insert(format!("{ROOT}/a/1.0/css/a.css"), file(b"a{}", 1_700_000_000_000));
    origin.insert(format!("{ROOT}/b/2.0/b.js"), file(b"b", 1_700_000_000_000));
    origin.insert(format!("{ROOT}/flat/flat.js"), file(b"flat", 1_700_000_000_000));
    origin
  }

  fn locator(enumerator: &dyn ResourceEnumerator) -> AssetLocator {
    AssetLocator::scan(enumerator, &LocatorConfig::default()).expect("scan should succeed")
  }

  #[test]
  fn strips_module_and_version_segments() {
    let temp = tempdir().expect("failed to create temp dir");
    let spy = Spy::new(bundles());
    let locator = locator(&spy);
    let cache = FileSystemCache::in_memory();
    let extractor = Extractor::new(&locator, &spy, &cache);

    let report = extractor.extract_all_to(temp.path()).expect("extraction should succeed");

    assert!(report.is_success());
    assert_eq!(report.copied, vec!["a/a.js", "a/css/a.css", "b/b.js", "flat/flat.js"]);
    assert_eq!(fs::read(temp.path().join("a/css/a.css")).unwrap(), b"a{}");
    assert_eq!(fs::read(temp.path().join("flat/flat.js")).unwrap(), b"flat");
  }

  #[test]
  fn second_pass_copies_nothing() {
    let temp = tempdir().expect("failed to create temp dir");
    let spy = Spy::new(bundles());
    let locator = locator(&spy);
    let cache = FileSystemCache::in_memory();
    let extractor = Extractor::new(&locator, &spy, &cache);

    extractor.extract_all_to(temp.path()).unwrap();
    assert_eq!(spy.reads(), 4);
    cache.persist().unwrap();

    let report = extractor.extract_all_to(temp.path()).unwrap();
    assert_eq!(spy.reads(), 0);
    assert!(report.copied.is_empty());
    assert_eq!(report.up_to_date, 4);
  }

  #[test]
  fn persisted_cache_survives_a_restart() {
    let temp = tempdir().expect("failed to create temp dir");
    let out = temp.path().join("out");
    let cache_path = temp.path().join("cache");
    let spy = Spy::new(bundles());
    let locator = locator(&spy);

    let cache = FileSystemCache::open(&cache_path);
    Extractor::new(&locator, &spy, &cache).extract_all_to(&out).unwrap();
    cache.persist().unwrap();
    spy.reads();

    let cache = FileSystemCache::open(&cache_path);
    let report = Extractor::new(&locator, &spy, &cache).extract_all_to(&out).unwrap();
    assert_eq!(spy.reads(), 0);
    assert_eq!(report.up_to_date, 4);
  }

  #[test]
  fn missing_destination_forces_a_copy() {
    let temp = tempdir().expect("failed to create temp dir");
    let spy = Spy::new(bundles());
    let locator = locator(&spy);
    let cache = FileSystemCache::in_memory();
    let extractor = Extractor::new(&locator, &spy, &cache);

    extractor.extract_all_to(temp.path()).unwrap();
    cache.persist().unwrap();
    spy.reads();
    fs::remove_file(temp.path().join("b/b.js")).unwrap();

    let report = extractor.extract_all_to(temp.path()).unwrap();
    assert_eq!(spy.reads(), 1);
    assert_eq!(report.copied, vec!["b/b.js"]);
    assert!(temp.path().join("b/b.js").exists());
  }

  #[test]
  fn changed_sources_are_copied_again() {
    let temp = tempdir().expect("failed to create temp dir");
    let cache = FileSystemCache::in_memory();

    let spy = Spy::new(bundles());
    let locator = locator(&spy);
    Extractor::new(&locator, &spy, &cache).extract_all_to(temp.path()).unwrap();
    cache.persist().unwrap();

    let mut updated = bundles();
    updated.insert(format!("{ROOT}/a/1.0/a.js"), file(b"a2", 1_800_000_000_000));
    let spy = Spy::new(updated);
    let report = Extractor::new(&locator, &spy, &cache).extract_all_to(temp.path()).unwrap();

    assert_eq!(report.copied, vec!["a/a.js"]);
    assert_eq!(fs::read(temp.path().join("a/a.js")).unwrap(), b"a2");
  }

  #[test]
  fn reports_files_of_deselected_modules_as_stale() {
    let temp = tempdir().expect("failed to create temp dir");
    let spy = Spy::new(bundles());
    let locator = locator(&spy);
    let cache = FileSystemCache::in_memory();
    let extractor = Extractor::new(&locator, &spy, &cache);

    extractor
      .extract(&ModuleSelection::only(["a", "b"]), None, temp.path())
      .unwrap();
    cache.persist().unwrap();
    extractor.extract_module_to("a", temp.path()).unwrap();

    let stale = extractor.stale_files(temp.path());
    let expected = fs::canonicalize(temp.path().join("b/b.js")).unwrap();
    assert_eq!(stale, BTreeSet::from([expected]));

    assert_eq!(prune_stale(temp.path(), &stale).unwrap(), 1);
    assert!(!temp.path().join("b").exists());
    assert!(temp.path().join("a/a.js").exists());
    assert!(temp.path().exists());
  }

  #[test]
  fn remaps_folders_to_manifest_ids() {
    let temp = tempdir().expect("failed to create temp dir");
    let mut origin = bundles();
    origin.insert(
      format!("{ROOT}/a/1.0/package.json"),
      file(br#"{"name": "@scope/pkg-a", "version": "1.0"}"#, 1),
    );
    origin.insert(format!("{ROOT}/b/2.0/package.json"), file(br#"{"version": "2.0"}"#, 1));
    let spy = Spy::new(origin);
    let locator = locator(&spy);
    let cache = FileSystemCache::in_memory();
    let extractor = Extractor::new(&locator, &spy, &cache);

    let report = extractor.extract_node_modules_to(temp.path()).unwrap();

    assert_eq!(report.skipped_modules, vec!["b", "flat"]);
    assert!(temp.path().join("@scope/pkg-a/a.js").exists());
    assert!(temp.path().join("@scope/pkg-a/package.json").exists());
    assert!(!temp.path().join("b").exists());
    assert!(!temp.path().join("a").exists());
  }

  #[test]
  fn records_failures_and_continues() {
    let temp = tempdir().expect("failed to create temp dir");
    let mut spy = Spy::new(bundles());
    spy.failing = Some(format!("{ROOT}/a/1.0/a.js"));
    let locator = locator(&spy);
    let cache = FileSystemCache::in_memory();
    let extractor = Extractor::new(&locator, &spy, &cache);

    let report = extractor.extract_all_to(temp.path()).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].resource, format!("{ROOT}/a/1.0/a.js"));
    assert!(matches!(report.failures[0].cause, CopyError::Read(_)));
    assert_eq!(report.copied.len(), 3);
    assert!(!temp.path().join("a/a.js").exists());
  }

  #[test]
  fn applies_source_metadata() {
    let temp = tempdir().expect("failed to create temp dir");
    let spy = Spy::new(bundles());
    let locator = locator(&spy);
    let cache = FileSystemCache::in_memory();
    Extractor::new(&locator, &spy, &cache)
      .extract_module_to("b", temp.path())
      .unwrap();

    let metadata = fs::metadata(temp.path().join("b/b.js")).unwrap();
    let mtime = FileTime::from_last_modification_time(&metadata);
    assert_eq!(mtime.unix_seconds(), 1_700_000_000);

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      assert_eq!(metadata.permissions().mode() & 0o7777, 0o640);
    }
  }

  #[test]
  fn refuses_entries_that_climb_out_of_the_output() {
    let temp = tempdir().expect("failed to create temp dir");
    let out = temp.path().join("out");
    let mut origin = MemoryOrigin::new("bundles");
    origin.insert(format!("{ROOT}/m/1.0/m.js"), file(b"m", 1));
    origin.insert(format!("{ROOT}/m/1.0/../../../../escaped.txt"), file(b"x", 1));
    let spy = Spy::new(origin);
    let locator = locator(&spy);
    let cache = FileSystemCache::in_memory();

    let report = Extractor::new(&locator, &spy, &cache)
      .extract_module_to("m", &out)
      .unwrap();

    assert_eq!(report.copied, vec!["m/m.js"]);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0].cause, CopyError::Escapes(_)));
    assert!(!temp.path().join("escaped.txt").exists());
    assert!(!out.join("escaped.txt").exists());
  }

  #[test]
  fn refuses_manifest_ids_that_climb_out_of_the_output() {
    let temp = tempdir().expect("failed to create temp dir");
    let out = temp.path().join("out");
    let mut origin = MemoryOrigin::new("bundles");
    origin.insert(format!("{ROOT}/m/1.0/m.js"), file(b"m", 1));
    origin.insert(format!("{ROOT}/m/1.0/package.json"), file(br#"{"name": "../x"}"#, 1));
    let spy = Spy::new(origin);
    let locator = locator(&spy);
    let cache = FileSystemCache::in_memory();

    let report = Extractor::new(&locator, &spy, &cache)
      .extract_node_modules_to(&out)
      .unwrap();

    assert!(report.copied.is_empty());
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|failure| matches!(failure.cause, CopyError::Escapes(_))));
    assert!(!temp.path().join("x").exists());
  }

  #[test]
  fn prune_removes_nested_empty_directories() {
    let temp = tempdir().expect("failed to create temp dir");
    let root = fs::canonicalize(temp.path()).unwrap();
    fs::create_dir_all(root.join("m/css/themes")).unwrap();
    fs::write(root.join("m/css/themes/dark.css"), "x").unwrap();
    fs::write(root.join("m/m.js"), "x").unwrap();

    let stale = BTreeSet::from([root.join("m/css/themes/dark.css")]);
    assert_eq!(prune_stale(&root, &stale).unwrap(), 1);
    assert!(!root.join("m/css").exists());
    assert!(root.join("m/m.js").exists());
  }

  #[test]
  fn prune_ignores_paths_outside_the_root() {
    let temp = tempdir().expect("failed to create temp dir");
    let outside = temp.path().join("outside.txt");
    fs::write(&outside, "x").unwrap();
    let out = temp.path().join("out");
    fs::create_dir_all(&out).unwrap();

    let stale = BTreeSet::from([fs::canonicalize(&outside).unwrap()]);
    assert_eq!(prune_stale(&out, &stale).unwrap(), 0);
    assert!(outside.exists());
  }
}
