//! Change-detection cache deciding which extracted files need copying again.
//!
//! Each extraction pass starts from the entries persisted by the previous pass (`on_disk`)
//! and accumulates the entries it saw (`touched`). Persisting rotates the two, so anything
//! the previous pass extracted but this pass did not touch can be reported as stale.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::models::CacheEntry;

/// Bookkeeping consulted by the extractor for every candidate file.
pub trait ExtractionCache: Send + Sync {
  /// Whether the file stored under `key` was produced from `candidate`.
  fn is_current(&self, key: &str, candidate: &CacheEntry) -> bool;

  /// Remember that `key` was just produced from `entry`.
  fn record(&self, key: &str, entry: CacheEntry);

  /// Files extracted by the previous pass that the current pass did not touch.
  fn stale_destinations(&self, base: &Path) -> BTreeSet<PathBuf>;

  /// Make the current pass the baseline for the next one.
  fn persist(&self) -> io::Result<()>;
}

#[derive(Debug, Default)]
struct CacheState {
  on_disk: BTreeMap<String, CacheEntry>,
  touched: BTreeMap<String, CacheEntry>,
  dirty: bool,
}

/// Extraction cache stored as `key:lastModified:source` lines.
#[derive(Debug, Default)]
pub struct FileSystemCache {
  path: Option<PathBuf>,
  state: Mutex<CacheState>,
}

impl FileSystemCache {
  /// Cache persisted at `path`.
  ///
  /// A file that does not exist yet starts an empty cache. A file that cannot be read is
  /// logged and also starts empty, so extraction degrades to copying everything.
  pub fn open(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    let on_disk = match load_entries(&path) {
      Ok(entries) => entries,
      Err(err) => {
        warn!(path = %path.display(), error = %err, "failed to load extraction cache, starting empty");
        BTreeMap::new()
      }
    };

    Self {
      path: Some(path),
      state: Mutex::new(CacheState {
        on_disk,
        ..CacheState::default()
      }),
    }
  }

  /// Cache that is never written to disk.
  pub fn in_memory() -> Self {
    Self::default()
  }

  /// Where the cache is persisted, if anywhere.
  pub fn path(&self) -> Option<&Path> {
    self.path.as_deref()
  }

  /// Discard the current pass and reload the persisted entries.
  pub fn reset(&self) -> io::Result<()> {
    let on_disk = match &self.path {
      Some(path) => load_entries(path)?,
      None => BTreeMap::new(),
    };
    let mut state = self.lock();
    state.on_disk = on_disk;
    state.touched.clear();
    state.dirty = false;
    Ok(())
  }

  /// Number of entries known from the previous pass.
  pub fn persisted_len(&self) -> usize {
    self.lock().on_disk.len()
  }

  /// Number of entries seen in the current pass.
  pub fn touched_len(&self) -> usize {
    self.lock().touched.len()
  }

  fn lock(&self) -> MutexGuard<'_, CacheState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl ExtractionCache for FileSystemCache {
  fn is_current(&self, key: &str, candidate: &CacheEntry) -> bool {
    let mut state = self.lock();
    if let Some(entry) = state.touched.get(key) {
      return entry == candidate;
    }
    let Some(entry) = state.on_disk.get(key).cloned() else {
      return false;
    };
    let current = &entry == candidate;
    state.touched.insert(key.to_string(), entry);
    current
  }

  fn record(&self, key: &str, entry: CacheEntry) {
    let mut state = self.lock();
    state.touched.insert(key.to_string(), entry);
    state.dirty = true;
  }

  fn stale_destinations(&self, base: &Path) -> BTreeSet<PathBuf> {
    let state = self.lock();
    let touched: BTreeSet<PathBuf> = state
      .touched
      .keys()
      .map(|key| canonical(&base.join(key)))
      .collect();

    state
      .on_disk
      .keys()
      .map(|key| base.join(key))
      .filter(|path| path.exists())
      .map(|path| canonical(&path))
      .filter(|path| !touched.contains(path))
      .collect()
  }

  fn persist(&self) -> io::Result<()> {
    let mut guard = self.lock();
    let state = &mut *guard;
    let changed = state.dirty || state.touched.len() != state.on_disk.len();
    if let Some(path) = self.path.as_deref().filter(|_| changed) {
      write_entries(path, &state.touched)?;
      debug!(path = %path.display(), entries = state.touched.len(), "persisted extraction cache");
    }
    state.on_disk = std::mem::take(&mut state.touched);
    state.dirty = false;
    Ok(())
  }
}

fn canonical(path: &Path) -> PathBuf {
  fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn load_entries(path: &Path) -> io::Result<BTreeMap<String, CacheEntry>> {
  let content = match fs::read(path) {
    Ok(content) => content,
    Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
    Err(err) => return Err(err),
  };

  Ok(
    content
      .split(|byte| *byte == b'\n')
      .filter_map(|raw| match std::str::from_utf8(raw) {
        Ok(line) => Some(line.trim_end_matches('\r')),
        Err(err) => {
          debug!(error = %err, "skipping extraction cache line that is not UTF-8");
          None
        }
      })
      .filter(|line| !line.trim().is_empty())
      .filter_map(|line| {
        let parsed = parse_line(line);
        if parsed.is_none() {
          debug!(line, "skipping malformed extraction cache line");
        }
        parsed
      })
      .collect(),
  )
}

fn parse_line(line: &str) -> Option<(String, CacheEntry)> {
  let mut fields = line.splitn(3, ':');
  let key = fields.next().filter(|key| !key.is_empty())?;
  let last_modified = fields.next()?.parse::<i64>().ok()?;
  let source = fields.next()?;
  Some((key.to_string(), CacheEntry::new(source, last_modified)))
}

fn write_entries(path: &Path, entries: &BTreeMap<String, CacheEntry>) -> io::Result<()> {
  if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
    fs::create_dir_all(parent)?;
  }

  let mut content = String::new();
  for (key, entry) in entries {
    content.push_str(&format!("{}:{}:{}\n", key, entry.last_modified, entry.source));
  }

  let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
  temp_name.push(".tmp");
  let temp = path.with_file_name(temp_name);
  fs::write(&temp, content)?;
  fs::rename(&temp, path)
}
