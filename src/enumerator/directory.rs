use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{EnumerationError, ResourceEnumerator, modified_millis};
use crate::asset_paths::should_ignore_entry;
use crate::models::EnumeratedResource;

/// Directory tree whose relative file paths are resource paths.
#[derive(Debug, Clone)]
pub struct DirectoryOrigin {
  path: PathBuf,
  max_depth: usize,
}

impl DirectoryOrigin {
  /// Origin rooted at `path`, refusing to descend more than `max_depth` levels below the
  /// namespace root.
  pub fn new(path: impl Into<PathBuf>, max_depth: usize) -> Self {
    Self {
      path: path.into(),
      max_depth,
    }
  }

  /// Identifier in `dir:<path>` form.
  pub fn id(&self) -> String {
    format!("dir:{}", self.path.to_string_lossy().replace('\\', "/"))
  }

  fn relative_path(&self, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(&self.path).ok()?;
    Some(relative.to_string_lossy().replace('\\', "/"))
  }
}

impl ResourceEnumerator for DirectoryOrigin {
  fn enumerate(
    &self,
    root: &str,
    filter: &dyn Fn(&str) -> bool,
  ) -> Result<Vec<EnumeratedResource>, EnumerationError> {
    let base = self.path.join(root);
    if !base.is_dir() {
      return Ok(Vec::new());
    }

    let origin = self.id();
    let mut resources = Vec::new();
    for entry in WalkDir::new(&base).sort_by_file_name() {
      let entry = entry.map_err(|source| EnumerationError::Walk {
        root: base.clone(),
        source,
      })?;
      if entry.depth() > self.max_depth {
        return Err(EnumerationError::DepthExceeded {
          root: base,
          depth: self.max_depth,
        });
      }
      if !entry.file_type().is_file() {
        continue;
      }

      let Some(path) = self.relative_path(entry.path()) else {
        continue;
      };
      if should_ignore_entry(&path) || !filter(&path) {
        continue;
      }

      let metadata = entry.metadata().map_err(|source| EnumerationError::Walk {
        root: base.clone(),
        source,
      })?;
      resources.push(EnumeratedResource {
        path,
        origin: origin.clone(),
        last_modified: modified_millis(&metadata),
        mode: permission_bits(&metadata),
      });
    }

    Ok(resources)
  }

  fn read(&self, resource: &EnumeratedResource) -> Result<Vec<u8>, EnumerationError> {
    let path = self.path.join(&resource.path);
    fs::read(&path).map_err(|source| EnumerationError::Io { path, source })
  }

  fn local_path(&self, resource: &EnumeratedResource) -> Option<PathBuf> {
    Some(self.path.join(&resource.path))
  }
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> Option<u32> {
  use std::os::unix::fs::PermissionsExt;
  Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn permission_bits(_metadata: &fs::Metadata) -> Option<u32> {
  None
}
