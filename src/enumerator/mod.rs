//! Resource enumeration over directories, archives and in-memory bundles.
//!
//! Everything above this module only ever sees [`EnumeratedResource`] values and the
//! [`ResourceEnumerator`] capability. The concrete storage is one of a closed set of
//! [`ResourceOrigin`] variants, chosen from the scheme of an origin identifier:
//!
//! | identifier                  | variant                            |
//! |-----------------------------|------------------------------------|
//! | `dir:/path/to/classes`      | [`ResourceOrigin::Directory`]      |
//! | `zip:/libs/a.jar`           | [`ResourceOrigin::Archive`]        |
//! | `zip:/app.war!/lib/a.jar`   | [`ResourceOrigin::NestedArchive`]  |
//! | `mem:name`                  | [`ResourceOrigin::Memory`]         |
//!
//! `jar:` and `file:` are accepted as aliases; bare paths are classified by inspecting the
//! filesystem.

mod archive;
mod directory;
mod memory;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::OffsetDateTime;

pub use archive::{ArchiveOrigin, NestedArchiveOrigin};
pub use directory::DirectoryOrigin;
pub use memory::{MemoryFile, MemoryOrigin};

use crate::models::EnumeratedResource;

/// Default recursion limit when walking directory origins.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Errors raised while listing or reading resources.
#[derive(Debug, Error)]
pub enum EnumerationError {
  /// Plain filesystem failure.
  #[error("failed to read {}: {source}", path.display())]
  Io {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    source: std::io::Error,
  },
  /// Directory traversal failure.
  #[error("failed to walk {}: {source}", root.display())]
  Walk {
    /// Directory being walked.
    root: PathBuf,
    /// Source traversal error.
    source: walkdir::Error,
  },
  /// The archive could not be opened or one of its entries could not be read.
  #[error("failed to read archive {origin}: {source}")]
  Archive {
    /// Origin identifier of the archive.
    origin: String,
    /// Source archive error.
    source: zip::result::ZipError,
  },
  /// A directory origin nests deeper than the configured limit.
  #[error("got deeper than {depth} levels while searching {}", root.display())]
  DepthExceeded {
    /// Directory being walked.
    root: PathBuf,
    /// Configured limit.
    depth: usize,
  },
  /// The origin identifier does not name a supported storage.
  #[error("unsupported resource origin: {0}")]
  UnknownOrigin(String),
  /// A resource was requested from an origin that does not provide it.
  #[error("{path} is not provided by {origin}")]
  MissingResource {
    /// Origin identifier that was asked.
    origin: String,
    /// Requested resource path.
    path: String,
  },
}

/// Capability to list resources below a namespace root and read their bytes.
pub trait ResourceEnumerator: Send + Sync {
  /// List every file whose full path lies below `root` and satisfies `filter`.
  fn enumerate(
    &self,
    root: &str,
    filter: &dyn Fn(&str) -> bool,
  ) -> Result<Vec<EnumeratedResource>, EnumerationError>;

  /// Read the bytes of a resource previously returned by [`ResourceEnumerator::enumerate`].
  fn read(&self, resource: &EnumeratedResource) -> Result<Vec<u8>, EnumerationError>;

  /// Filesystem location of the resource when it is a plain file.
  fn local_path(&self, _resource: &EnumeratedResource) -> Option<PathBuf> {
    None
  }
}

/// One storage location that resources are enumerated from.
#[derive(Debug)]
pub enum ResourceOrigin {
  /// Plain directory tree.
  Directory(DirectoryOrigin),
  /// Single archive on disk.
  Archive(ArchiveOrigin),
  /// Archive stored as an entry inside another archive.
  NestedArchive(NestedArchiveOrigin),
  /// In-memory set of files.
  Memory(MemoryOrigin),
}

impl ResourceOrigin {
  /// Classify an origin identifier by its scheme.
  pub fn parse(spec: &str, max_depth: usize) -> Result<Self, EnumerationError> {
    if let Some(path) = spec.strip_prefix("dir:") {
      return Ok(Self::Directory(DirectoryOrigin::new(path, max_depth)));
    }

    let archive = spec
      .strip_prefix("zip:")
      .or_else(|| spec.strip_prefix("jar:"));
    if let Some(location) = archive {
      let location = location.trim_end_matches("!/");
      return Ok(match location.split_once("!/") {
        Some((outer, inner)) => Self::NestedArchive(NestedArchiveOrigin::new(outer, inner)),
        None => Self::Archive(ArchiveOrigin::new(location)),
      });
    }

    let bare = spec.strip_prefix("file:").unwrap_or(spec);
    let path = Path::new(bare);
    if path.is_dir() {
      Ok(Self::Directory(DirectoryOrigin::new(path, max_depth)))
    } else if path.is_file() && has_archive_extension(path) {
      Ok(Self::Archive(ArchiveOrigin::new(path)))
    } else {
      Err(EnumerationError::UnknownOrigin(spec.to_string()))
    }
  }

  /// Stable identifier stamped on every resource from this origin.
  pub fn id(&self) -> String {
    match self {
      Self::Directory(origin) => origin.id(),
      Self::Archive(origin) => origin.id(),
      Self::NestedArchive(origin) => origin.id(),
      Self::Memory(origin) => origin.id(),
    }
  }

  fn as_enumerator(&self) -> &dyn ResourceEnumerator {
    match self {
      Self::Directory(origin) => origin as &dyn ResourceEnumerator,
      Self::Archive(origin) => origin as &dyn ResourceEnumerator,
      Self::NestedArchive(origin) => origin as &dyn ResourceEnumerator,
      Self::Memory(origin) => origin as &dyn ResourceEnumerator,
    }
  }
}

impl ResourceEnumerator for ResourceOrigin {
  fn enumerate(
    &self,
    root: &str,
    filter: &dyn Fn(&str) -> bool,
  ) -> Result<Vec<EnumeratedResource>, EnumerationError> {
    self.as_enumerator().enumerate(root, filter)
  }

  fn read(&self, resource: &EnumeratedResource) -> Result<Vec<u8>, EnumerationError> {
    self.as_enumerator().read(resource)
  }

  fn local_path(&self, resource: &EnumeratedResource) -> Option<PathBuf> {
    self.as_enumerator().local_path(resource)
  }
}

/// Modification time of a file in epoch milliseconds.
pub(crate) fn modified_millis(metadata: &fs::Metadata) -> Option<i64> {
  let modified = OffsetDateTime::from(metadata.modified().ok()?);
  i64::try_from(modified.unix_timestamp_nanos() / 1_000_000).ok()
}

fn has_archive_extension(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "zip" | "jar" | "war"))
}

/// Ordered collection of origins enumerated as one.
///
/// Results are concatenated in declaration order, so when two origins carry the same resource
/// path the first declared one is the one later de-duplication keeps.
#[derive(Debug, Default)]
pub struct OriginSet {
  origins: Vec<ResourceOrigin>,
}

impl OriginSet {
  /// Empty set.
  pub fn new() -> Self {
    Self::default()
  }

  /// Parse every identifier in order.
  pub fn from_specs<I, S>(specs: I, max_depth: usize) -> Result<Self, EnumerationError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let origins = specs
      .into_iter()
      .map(|spec| ResourceOrigin::parse(spec.as_ref(), max_depth))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self { origins })
  }

  /// Append an origin.
  pub fn with_origin(mut self, origin: ResourceOrigin) -> Self {
    self.origins.push(origin);
    self
  }

  /// Number of origins in the set.
  pub fn len(&self) -> usize {
    self.origins.len()
  }

  /// Whether the set has no origins.
  pub fn is_empty(&self) -> bool {
    self.origins.is_empty()
  }

  fn origin_of(&self, resource: &EnumeratedResource) -> Result<&ResourceOrigin, EnumerationError> {
    self
      .origins
      .iter()
      .find(|origin| origin.id() == resource.origin)
      .ok_or_else(|| EnumerationError::MissingResource {
        origin: resource.origin.clone(),
        path: resource.path.clone(),
      })
  }
}

impl ResourceEnumerator for OriginSet {
  fn enumerate(
    &self,
    root: &str,
    filter: &dyn Fn(&str) -> bool,
  ) -> Result<Vec<EnumeratedResource>, EnumerationError> {
    let mut resources = Vec::new();
    for origin in &self.origins {
      resources.extend(origin.enumerate(root, filter)?);
    }
    Ok(resources)
  }

  fn read(&self, resource: &EnumeratedResource) -> Result<Vec<u8>, EnumerationError> {
    self.origin_of(resource)?.read(resource)
  }

  fn local_path(&self, resource: &EnumeratedResource) -> Option<PathBuf> {
    self.origin_of(resource).ok()?.local_path(resource)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn parses_schemes_into_variants() {
    assert!(matches!(
      ResourceOrigin::parse("dir:/srv/classes", DEFAULT_MAX_DEPTH),
      Ok(ResourceOrigin::Directory(_))
    ));
    assert!(matches!(
      ResourceOrigin::parse("zip:/libs/a.jar", DEFAULT_MAX_DEPTH),
      Ok(ResourceOrigin::Archive(_))
    ));
    assert!(matches!(
      ResourceOrigin::parse("jar:/app.war!/WEB-INF/lib/a.jar!/", DEFAULT_MAX_DEPTH),
      Ok(ResourceOrigin::NestedArchive(_))
    ));
    assert!(matches!(
      ResourceOrigin::parse("/definitely/not/here", DEFAULT_MAX_DEPTH),
      Err(EnumerationError::UnknownOrigin(_))
    ));
  }

  #[test]
  fn classifies_bare_directories() {
    let temp = tempdir().unwrap();
    let spec = temp.path().to_string_lossy().to_string();
    let origin = ResourceOrigin::parse(&spec, DEFAULT_MAX_DEPTH).unwrap();
    assert!(matches!(origin, ResourceOrigin::Directory(_)));
    assert!(origin.id().starts_with("dir:"));
  }

  #[test]
  fn origin_set_concatenates_in_declaration_order() {
    let first = MemoryOrigin::new("first").with_file("root/a/1/x.js", b"1".to_vec());
    let second = MemoryOrigin::new("second").with_file("root/a/1/x.js", b"2".to_vec());
    let set = OriginSet::new()
      .with_origin(ResourceOrigin::Memory(first))
      .with_origin(ResourceOrigin::Memory(second));

    let resources = set.enumerate("root", &|_| true).unwrap();
    assert_eq!(resources.len(), 2);
    assert_eq!(resources[0].origin, "mem:first");
    assert_eq!(set.read(&resources[1]).unwrap(), b"2".to_vec());
  }

  #[test]
  fn reports_modification_times_in_milliseconds() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("a.js");
    std::fs::write(&file, "a").unwrap();
    filetime::set_file_mtime(&file, filetime::FileTime::from_unix_time(1_700_000_000, 250_000_000))
      .unwrap();

    let metadata = std::fs::metadata(&file).unwrap();
    assert_eq!(modified_millis(&metadata), Some(1_700_000_000_250));
  }

  #[test]
  fn reading_from_an_unknown_origin_fails() {
    let set = OriginSet::new();
    let resource = EnumeratedResource {
      path: "root/a/1/x.js".into(),
      origin: "mem:gone".into(),
      last_modified: None,
      mode: None,
    };
    assert!(matches!(
      set.read(&resource),
      Err(EnumerationError::MissingResource { .. })
    ));
  }
}
