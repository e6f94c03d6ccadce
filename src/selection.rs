//! Helpers used to filter which modules an extraction pass copies.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Trait describing selection filters for extraction passes.
pub trait ModuleInclusion {
  /// Returns `true` when the module should be extracted.
  fn is_included(&self, module: &str) -> bool;
}

/// Default selection file name searched for next to the output directory.
pub const DEFAULT_SELECTION_FILE: &str = "modules.local.json";

/// Configuration file layout for selecting which modules to extract.
#[derive(Debug, Default, Deserialize)]
struct ModuleSelectionFile {
  #[serde(default)]
  include: Vec<String>,
  #[serde(default)]
  exclude: Vec<String>,
}

/// Include and exclude lists applied to module names.
///
/// An empty include list admits every module; exclusions always win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSelection {
  include: Option<BTreeSet<String>>,
  exclude: BTreeSet<String>,
}

/// Errors that can occur while loading the selection configuration.
#[derive(Debug, Error)]
pub enum SelectionError {
  /// Failed to read the selection file from disk.
  #[error("failed to read {}: {source}", path.display())]
  Io {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    source: std::io::Error,
  },
  /// Failed to parse the JSON selection file.
  #[error("failed to parse {}: {source}", path.display())]
  Parse {
    /// Path that caused the error.
    path: PathBuf,
    /// Source parse error.
    source: serde_json::Error,
  },
}

impl ModuleSelection {
  /// Selection admitting every module.
  pub fn all() -> Self {
    Self::default()
  }

  /// Selection admitting only the listed modules.
  pub fn only<I, S>(modules: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::from_lists(modules, Vec::<String>::new())
  }

  /// Selection from raw include and exclude lists.
  pub fn from_lists<I, E, S, T>(include: I, exclude: E) -> Self
  where
    I: IntoIterator<Item = S>,
    E: IntoIterator<Item = T>,
    S: Into<String>,
    T: Into<String>,
  {
    Self::from(ModuleSelectionFile {
      include: include.into_iter().map(Into::into).collect(),
      exclude: exclude.into_iter().map(Into::into).collect(),
    })
  }

  /// Load configuration from the selection file if present.
  pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, SelectionError> {
    let path = path.as_ref();
    let contents = match fs::read_to_string(path) {
      Ok(contents) => contents,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
        return Ok(Self::default());
      }
      Err(err) => {
        return Err(SelectionError::Io {
          path: path.to_path_buf(),
          source: err,
        });
      }
    };

    let file: ModuleSelectionFile =
      serde_json::from_str(&contents).map_err(|err| SelectionError::Parse {
        path: path.to_path_buf(),
        source: err,
      })?;
    Ok(Self::from(file))
  }

  /// Extend this selection with further include and exclude lists.
  ///
  /// Includes are merged, so a selection restricted by a file stays restricted and also admits
  /// the extra modules. Exclusions from either side still win.
  pub fn with_lists<I, E, S, T>(mut self, include: I, exclude: E) -> Self
  where
    I: IntoIterator<Item = S>,
    E: IntoIterator<Item = T>,
    S: Into<String>,
    T: Into<String>,
  {
    let include = normalise_list(include.into_iter().map(Into::into));
    if !include.is_empty() {
      self.include.get_or_insert_with(BTreeSet::new).extend(include);
    }
    self
      .exclude
      .extend(normalise_list(exclude.into_iter().map(Into::into)));
    self
  }

  /// Determine whether a module should be extracted.
  pub fn is_included(&self, module: &str) -> bool {
    if self.exclude.contains(module) {
      return false;
    }

    match &self.include {
      Some(include) => include.contains(module),
      None => true,
    }
  }

  /// Returns true when no filtering rules are active.
  pub fn is_unfiltered(&self) -> bool {
    self.include.is_none() && self.exclude.is_empty()
  }
}

impl ModuleInclusion for ModuleSelection {
  fn is_included(&self, module: &str) -> bool {
    ModuleSelection::is_included(self, module)
  }
}

impl<F> ModuleInclusion for F
where
  F: Fn(&str) -> bool,
{
  fn is_included(&self, module: &str) -> bool {
    self(module)
  }
}

impl From<ModuleSelectionFile> for ModuleSelection {
  fn from(file: ModuleSelectionFile) -> Self {
    let include = normalise_list(file.include);
    let exclude = normalise_list(file.exclude);

    Self {
      include: (!include.is_empty()).then_some(include),
      exclude,
    }
  }
}

/// Convert a list of raw module names into a sorted, de-duplicated set.
///
/// Values are trimmed and empty entries are discarded to simplify downstream filtering logic.
fn normalise_list(values: impl IntoIterator<Item = String>) -> BTreeSet<String> {
  values
    .into_iter()
    .map(|value| value.trim().trim_matches('/').to_string())
    .filter(|value| !value.is_empty())
    .collect()
}
