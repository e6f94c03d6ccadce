use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use time::{Date, Month, PrimitiveDateTime, Time};
use tracing::debug;
use zip::result::ZipError;
use zip::{DateTime, ZipArchive};

use super::{EnumerationError, ResourceEnumerator};
use crate::asset_paths::{is_enclosed_path, should_ignore_entry};
use crate::models::EnumeratedResource;

/// Archive opened on first use and kept open for every later listing and read.
struct OpenArchive<R> {
  slot: Mutex<Option<ZipArchive<R>>>,
}

impl<R: Read + Seek> OpenArchive<R> {
  fn new() -> Self {
    Self {
      slot: Mutex::new(None),
    }
  }

  fn with<T>(
    &self,
    origin: &str,
    open: impl FnOnce() -> Result<ZipArchive<R>, EnumerationError>,
    action: impl FnOnce(&mut ZipArchive<R>) -> Result<T, ZipError>,
  ) -> Result<T, EnumerationError> {
    let mut guard = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
    let archive = match guard.take() {
      Some(archive) => archive,
      None => open()?,
    };
    let archive = guard.insert(archive);
    action(archive).map_err(|source| EnumerationError::Archive {
      origin: origin.to_string(),
      source,
    })
  }
}

impl<R> fmt::Debug for OpenArchive<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let open = self
      .slot
      .lock()
      .map(|slot| slot.is_some())
      .unwrap_or_default();
    f.debug_struct("OpenArchive").field("open", &open).finish()
  }
}

/// Archive on disk (`.jar`, `.zip`, `.war`).
#[derive(Debug)]
pub struct ArchiveOrigin {
  path: PathBuf,
  archive: OpenArchive<File>,
}

impl ArchiveOrigin {
  /// Origin backed by the archive at `path`.
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      archive: OpenArchive::new(),
    }
  }

  /// Identifier in `zip:<path>` form.
  pub fn id(&self) -> String {
    format!("zip:{}", self.path.to_string_lossy().replace('\\', "/"))
  }

  fn open(&self) -> Result<ZipArchive<File>, EnumerationError> {
    let file = File::open(&self.path).map_err(|source| EnumerationError::Io {
      path: self.path.clone(),
      source,
    })?;
    ZipArchive::new(file).map_err(|source| EnumerationError::Archive {
      origin: self.id(),
      source,
    })
  }
}

impl ResourceEnumerator for ArchiveOrigin {
  fn enumerate(
    &self,
    root: &str,
    filter: &dyn Fn(&str) -> bool,
  ) -> Result<Vec<EnumeratedResource>, EnumerationError> {
    let origin = self.id();
    self.archive.with(
      &origin,
      || self.open(),
      |archive| list_entries(archive, &origin, root, filter),
    )
  }

  fn read(&self, resource: &EnumeratedResource) -> Result<Vec<u8>, EnumerationError> {
    self.archive.with(
      &self.id(),
      || self.open(),
      |archive| read_entry(archive, &resource.path),
    )
  }
}

/// Archive stored as an entry of another archive, such as a library inside a web application.
///
/// The inner archive is read into memory once, on first use, and stays open for every later
/// listing and read.
#[derive(Debug)]
pub struct NestedArchiveOrigin {
  outer: PathBuf,
  entry: String,
  archive: OpenArchive<Cursor<Vec<u8>>>,
}

impl NestedArchiveOrigin {
  /// Origin for the archive stored at `entry` inside `outer`.
  pub fn new(outer: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
    Self {
      outer: outer.into(),
      entry: entry.into(),
      archive: OpenArchive::new(),
    }
  }

  /// Identifier in `zip:<outer>!/<entry>` form.
  pub fn id(&self) -> String {
    format!(
      "zip:{}!/{}",
      self.outer.to_string_lossy().replace('\\', "/"),
      self.entry
    )
  }

  fn open(&self) -> Result<ZipArchive<Cursor<Vec<u8>>>, EnumerationError> {
    let outer = ArchiveOrigin::new(&self.outer);
    let outer_id = outer.id();
    let bytes = outer
      .archive
      .with(&outer_id, || outer.open(), |archive| read_entry(archive, &self.entry))?;
    ZipArchive::new(Cursor::new(bytes)).map_err(|source| EnumerationError::Archive {
      origin: self.id(),
      source,
    })
  }
}

impl ResourceEnumerator for NestedArchiveOrigin {
  fn enumerate(
    &self,
    root: &str,
    filter: &dyn Fn(&str) -> bool,
  ) -> Result<Vec<EnumeratedResource>, EnumerationError> {
    let origin = self.id();
    self.archive.with(
      &origin,
      || self.open(),
      |archive| list_entries(archive, &origin, root, filter),
    )
  }

  fn read(&self, resource: &EnumeratedResource) -> Result<Vec<u8>, EnumerationError> {
    self.archive.with(
      &self.id(),
      || self.open(),
      |archive| read_entry(archive, &resource.path),
    )
  }
}

fn list_entries<R: Read + Seek>(
  archive: &mut ZipArchive<R>,
  origin: &str,
  root: &str,
  filter: &dyn Fn(&str) -> bool,
) -> Result<Vec<EnumeratedResource>, ZipError> {
  let prefix = format!("{}/", root.trim_end_matches('/'));
  let mut resources = Vec::new();
  for index in 0..archive.len() {
    let entry = archive.by_index(index)?;
    if entry.is_dir() {
      continue;
    }

    let path = entry.name().to_string();
    if !path.starts_with(&prefix) || should_ignore_entry(&path) {
      continue;
    }
    if !is_enclosed_path(&path) {
      debug!(origin, entry = %path, "skipping archive entry that leaves its directory");
      continue;
    }
    if !filter(&path) {
      continue;
    }

    resources.push(EnumeratedResource {
      last_modified: entry.last_modified().and_then(epoch_millis),
      mode: entry.unix_mode().map(|mode| mode & 0o7777),
      origin: origin.to_string(),
      path,
    });
  }
  resources.sort_by(|left, right| left.path.cmp(&right.path));
  Ok(resources)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>, ZipError> {
  let mut entry = archive.by_name(name)?;
  let mut bytes = Vec::new();
  entry.read_to_end(&mut bytes)?;
  Ok(bytes)
}

/// Convert an archive timestamp to epoch milliseconds.
///
/// Archive timestamps carry no zone; they are read as UTC. Impossible dates yield `None`.
fn epoch_millis(stamp: DateTime) -> Option<i64> {
  let month = Month::try_from(stamp.month()).ok()?;
  let date = Date::from_calendar_date(i32::from(stamp.year()), month, stamp.day()).ok()?;
  let time = Time::from_hms(stamp.hour(), stamp.minute(), stamp.second()).ok()?;
  let seconds = PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp();
  Some(seconds * 1_000)
}
