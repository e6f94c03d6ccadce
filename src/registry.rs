//! Partition of the indexed paths into modules, each tagged with its inferred version.

use std::collections::{BTreeMap, BTreeSet};

use crate::asset_paths::module_prefix;
use crate::index::PathIndex;
use crate::models::ModuleInfo;

/// Module name to [`ModuleInfo`], built once from a [`PathIndex`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRegistry {
  root: String,
  modules: BTreeMap<String, ModuleInfo>,
}

impl ModuleRegistry {
  /// Group every indexed path by the segment right after the namespace root.
  ///
  /// `origins` maps a full path to the origin it was enumerated from; the first path of a
  /// module decides the module's origin. `groups` carries publishing groups found in
  /// descriptors and is keyed by module name.
  pub fn build(
    index: &PathIndex,
    origins: &BTreeMap<String, String>,
    groups: &BTreeMap<String, String>,
  ) -> Self {
    let root = index.root().to_string();
    let mut partitions: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();

    for path in index.iter() {
      let Some(module) = module_segment(&root, path) else {
        continue;
      };
      partitions
        .entry(module)
        .or_default()
        .insert(path.to_string());
    }

    let modules = partitions
      .into_iter()
      .map(|(name, contents)| {
        let origin = contents
          .iter()
          .find_map(|path| origins.get(path))
          .cloned()
          .unwrap_or_default();
        let info = ModuleInfo {
          name: name.to_string(),
          version: infer_version(&root, name, &contents),
          origin,
          group: groups.get(name).cloned(),
          contents,
        };
        (name.to_string(), info)
      })
      .collect();

    Self { root, modules }
  }

  /// Namespace root shared by every module.
  pub fn root(&self) -> &str {
    &self.root
  }

  /// Information about `module`, if any path belongs to it.
  pub fn get(&self, module: &str) -> Option<&ModuleInfo> {
    self.modules.get(module)
  }

  /// Whether `module` owns at least one indexed path.
  pub fn contains(&self, module: &str) -> bool {
    self.modules.contains_key(module)
  }

  /// Modules in ascending name order.
  pub fn iter(&self) -> impl Iterator<Item = &ModuleInfo> {
    self.modules.values()
  }

  /// Number of modules.
  pub fn len(&self) -> usize {
    self.modules.len()
  }

  /// Whether no module was found.
  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }

  /// Module name to inferred version, `None` for flat-layout modules.
  pub fn versions(&self) -> BTreeMap<String, Option<String>> {
    self
      .modules
      .values()
      .map(|info| (info.name.clone(), info.version.clone()))
      .collect()
  }

  /// Module owning the full resource `path`.
  pub fn owner_of(&self, path: &str) -> Option<&ModuleInfo> {
    let module = module_segment(&self.root, path)?;
    self
      .modules
      .get(module)
      .filter(|info| info.contents.contains(path))
  }
}

/// Version segment shared by every path of `module`, if there is one.
///
/// The segment after the module name of any path is a candidate; it only counts as the
/// version when every path of the partition lives below it. Empty partitions and flat layouts
/// have no version.
pub fn infer_version(root: &str, module: &str, contents: &BTreeSet<String>) -> Option<String> {
  let prefix = module_prefix(root, module);
  let first = contents.iter().next()?;
  let (candidate, _) = first.strip_prefix(&prefix)?.split_once('/')?;
  if candidate.is_empty() {
    return None;
  }

  let version_prefix = format!("{}{}/", prefix, candidate);
  contents
    .iter()
    .all(|path| path.starts_with(&version_prefix))
    .then(|| candidate.to_string())
}

fn module_segment<'a>(root: &str, path: &'a str) -> Option<&'a str> {
  let rest = path.strip_prefix(root)?.strip_prefix('/')?;
  let (module, _) = rest.split_once('/')?;
  (!module.is_empty()).then_some(module)
}
