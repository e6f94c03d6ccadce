use std::collections::BTreeMap;

use super::{EnumerationError, ResourceEnumerator};
use crate::models::EnumeratedResource;

/// Contents and metadata of one in-memory file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFile {
  /// File contents.
  pub bytes: Vec<u8>,
  /// Modification time in epoch milliseconds.
  pub last_modified: Option<i64>,
  /// POSIX permission bits.
  pub mode: Option<u32>,
}

/// Named set of files held in memory, for embedded bundles and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryOrigin {
  name: String,
  files: BTreeMap<String, MemoryFile>,
}

impl MemoryOrigin {
  /// Empty origin identified as `mem:<name>`.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      files: BTreeMap::new(),
    }
  }

  /// Add a file with no metadata.
  pub fn with_file(mut self, path: impl Into<String>, bytes: Vec<u8>) -> Self {
    self.insert(path, MemoryFile {
      bytes,
      ..MemoryFile::default()
    });
    self
  }

  /// Add or replace a file.
  pub fn insert(&mut self, path: impl Into<String>, file: MemoryFile) {
    self.files.insert(path.into(), file);
  }

  /// Identifier in `mem:<name>` form.
  pub fn id(&self) -> String {
    format!("mem:{}", self.name)
  }
}

impl ResourceEnumerator for MemoryOrigin {
  fn enumerate(
    &self,
    root: &str,
    filter: &dyn Fn(&str) -> bool,
  ) -> Result<Vec<EnumeratedResource>, EnumerationError> {
    let prefix = format!("{}/", root.trim_end_matches('/'));
    let origin = self.id();
    Ok(
      self
        .files
        .range(prefix.clone()..)
        .take_while(|(path, _)| path.starts_with(&prefix))
        .filter(|(path, _)| filter(path))
        .map(|(path, file)| EnumeratedResource {
          path: path.clone(),
          origin: origin.clone(),
          last_modified: file.last_modified,
          mode: file.mode,
        })
        .collect(),
    )
  }

  fn read(&self, resource: &EnumeratedResource) -> Result<Vec<u8>, EnumerationError> {
    self
      .files
      .get(&resource.path)
      .map(|file| file.bytes.clone())
      .ok_or_else(|| EnumerationError::MissingResource {
        origin: self.id(),
        path: resource.path.clone(),
      })
  }
}
