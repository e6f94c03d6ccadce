//! Read-only façade answering lookups over one snapshot of bundled resources.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::asset_paths::{ResourceCoordinates, split_resource_path};
use crate::config::LocatorConfig;
use crate::enumerator::{EnumerationError, ResourceEnumerator};
use crate::error::{LookupError, LookupResult};
use crate::index::PathIndex;
use crate::manifest::DescriptorPattern;
use crate::models::{DeclaredVersion, EnumeratedResource, ModuleInfo};
use crate::registry::ModuleRegistry;
use crate::version::{DescriptorVersionSource, VersionCache, VersionResolver, exact_path};

/// Path index plus module registry, built once and shared freely between threads.
#[derive(Debug, Clone, Default)]
pub struct AssetLocator {
  index: Arc<PathIndex>,
  registry: ModuleRegistry,
  versions: Arc<VersionCache>,
}

impl AssetLocator {
  /// Locator over bare paths with no origin or group information.
  pub fn from_paths<I, S>(root: &str, paths: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let index = PathIndex::build(root, paths);
    let registry = ModuleRegistry::build(&index, &BTreeMap::new(), &BTreeMap::new());
    Self::assemble(index, registry)
  }

  /// Locator over enumerated resources. When two origins provide the same path, the first
  /// one listed keeps it.
  pub fn from_resources(
    root: &str,
    resources: &[EnumeratedResource],
    groups: &BTreeMap<String, String>,
  ) -> Self {
    let mut origins: BTreeMap<String, String> = BTreeMap::new();
    for resource in resources {
      origins
        .entry(resource.path.clone())
        .or_insert_with(|| resource.origin.clone());
    }

    let index = PathIndex::build(root, origins.keys().cloned());
    let registry = ModuleRegistry::build(&index, &origins, groups);
    Self::assemble(index, registry)
  }

  /// Enumerate every bundle below the configured namespace root, tagging modules with the
  /// group of the descriptor found for them.
  pub fn scan(
    enumerator: &dyn ResourceEnumerator,
    config: &LocatorConfig,
  ) -> Result<Self, EnumerationError> {
    let root = config.root();
    let resources = enumerator.enumerate(root, &|_| true)?;
    let groups = descriptor_groups(enumerator, config)?;
    Ok(Self::from_resources(root, &resources, &groups))
  }

  fn assemble(index: PathIndex, registry: ModuleRegistry) -> Self {
    let versions = VersionCache::new();
    for info in registry.iter() {
      versions.seed(&info.name, info.version.clone());
    }
    Self {
      index: Arc::new(index),
      registry,
      versions: Arc::new(versions),
    }
  }

  /// Namespace root of the snapshot.
  pub fn root(&self) -> &str {
    self.index.root()
  }

  /// The underlying path index.
  pub fn index(&self) -> &Arc<PathIndex> {
    &self.index
  }

  /// The underlying module registry.
  pub fn registry(&self) -> &ModuleRegistry {
    &self.registry
  }

  /// Resolve a partial path against every indexed resource.
  pub fn full_path(&self, partial: &str) -> LookupResult<String> {
    self.index.resolve(partial)
  }

  /// Resolve a partial path among the resources of `module` only.
  ///
  /// An unknown module is reported as not found, naming the module.
  pub fn full_path_in(&self, module: &str, partial: &str) -> LookupResult<String> {
    let info = self
      .registry
      .get(module)
      .ok_or_else(|| LookupError::not_found(module))?;
    self
      .index
      .resolve_where(partial, |path| info.contents.contains(path))
  }

  /// Compose `<root>/<module>/<version>/<relative>` and return it when indexed.
  ///
  /// `relative` may already start with the version; it is not repeated. Flat-layout modules
  /// compose without a version segment.
  pub fn full_path_exact(&self, module: &str, relative: &str) -> Option<String> {
    let version = self.registry.get(module).and_then(|info| info.version.as_deref());
    exact_path(&self.index, module, version, relative)
  }

  /// Every indexed path below `prefix`, either root-relative or a full path prefix.
  pub fn list_assets(&self, prefix: &str) -> Vec<String> {
    self.index.list_under_prefix(prefix)
  }

  /// Module name to inferred version.
  pub fn modules(&self) -> BTreeMap<String, Option<String>> {
    self.registry.versions()
  }

  /// Everything known about `module`.
  pub fn module(&self, module: &str) -> Option<&ModuleInfo> {
    self.registry.get(module)
  }

  /// Module owning the full path `path`, together with the group it was published under.
  pub fn owner_of(&self, path: &str) -> Option<&ModuleInfo> {
    self.registry.owner_of(path)
  }

  /// Module, version and relative segments of an indexed path.
  pub fn coordinates<'p>(&self, path: &'p str) -> Option<ResourceCoordinates<'p>> {
    if !self.index.contains(path) {
      return None;
    }
    split_resource_path(self.root(), path)
  }

  /// A version resolver answering from the versions inferred for this snapshot.
  pub fn version_resolver(&self) -> VersionResolver {
    VersionResolver::new(Arc::clone(&self.index)).with_cache(Arc::clone(&self.versions))
  }

  /// A version resolver consulting the packaged descriptors and declared overrides first.
  ///
  /// `overrides` are registered before the ones in `config`, so they win for any module both
  /// declare.
  pub fn configured_resolver<I>(
    &self,
    enumerator: Arc<dyn ResourceEnumerator>,
    config: &LocatorConfig,
    overrides: I,
  ) -> VersionResolver
  where
    I: IntoIterator<Item = DeclaredVersion>,
  {
    let source = DescriptorVersionSource::new(
      enumerator,
      config.descriptor_root.clone(),
      config.descriptor_groups.clone(),
      config.descriptor_file.clone(),
    );
    let resolver = VersionResolver::new(Arc::clone(&self.index))
      .with_separator(config.version_separator)
      .with_source(source);
    let accepted = resolver.register_overrides(overrides)
      + resolver.register_overrides(config.version_overrides.iter().cloned());
    debug!(accepted, "registered version overrides");
    resolver
  }
}

fn descriptor_groups(
  enumerator: &dyn ResourceEnumerator,
  config: &LocatorConfig,
) -> Result<BTreeMap<String, String>, EnumerationError> {
  let pattern = match DescriptorPattern::new(&config.descriptor_root, &config.descriptor_file) {
    Ok(pattern) => pattern,
    Err(err) => {
      tracing::warn!(error = %err, "invalid descriptor location, skipping group detection");
      return Ok(BTreeMap::new());
    }
  };
  let root = config.descriptor_root.trim_end_matches('/');
  let descriptors = enumerator.enumerate(root, &|path| pattern.is_match(path))?;

  let rank = |group: &str| {
    config
      .descriptor_groups
      .iter()
      .position(|known| known == group)
      .unwrap_or(usize::MAX)
  };
  let mut groups: BTreeMap<String, String> = BTreeMap::new();
  for resource in &descriptors {
    let Some((group, module)) = pattern.coordinates(&resource.path) else {
      continue;
    };
    let replace = groups
      .get(module)
      .is_none_or(|existing| rank(group) < rank(existing.as_str()));
    if replace {
      groups.insert(module.to_string(), group.to_string());
    }
  }
  Ok(groups)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::enumerator::{MemoryOrigin, OriginSet, ResourceOrigin};

  const ROOT: &str = "META-INF/resources/webjars";

  fn locator() -> AssetLocator {
    AssetLocator::from_paths(
      ROOT,
      [
        "angular-locale/1.2.0/angular-locale_en.js",
        "angular-locale/1.2.0/i18n/angular-locale_en-us.js",
        "bootstrap/3.1.1/js/bootstrap.js",
        "bootstrap/3.1.1/css/bootstrap.css",
        "foundation/5.0.0/js/foundation.js",
        "flat/flat.js",
      ]
      .iter()
      .map(|path| format!("{ROOT}/{path}")),
    )
  }

  #[test]
  fn resolves_across_every_module() {
    let locator = locator();
    assert_eq!(
      locator.full_path("bootstrap.js").unwrap(),
      format!("{ROOT}/bootstrap/3.1.1/js/bootstrap.js")
    );
    assert!(locator.full_path("missing.js").is_err());
  }

  #[test]
  fn resolves_within_one_module() {
    let locator = locator();
    assert_eq!(
      locator.full_path_in("foundation", "js/foundation.js").unwrap(),
      format!("{ROOT}/foundation/5.0.0/js/foundation.js")
    );
    assert_eq!(
      locator.full_path_in("foundation", "bootstrap.js"),
      Err(LookupError::not_found("bootstrap.js"))
    );
    assert_eq!(
      locator.full_path_in("unknown", "a.js"),
      Err(LookupError::not_found("unknown"))
    );
  }

  #[test]
  fn scoping_to_a_module_removes_cross_module_ambiguity() {
    let locator = AssetLocator::from_paths(
      ROOT,
      [
        format!("{ROOT}/angularjs/1.2.0/angular.js"),
        format!("{ROOT}/angular-foo/0.1.0/angular.js"),
      ],
    );
    assert!(matches!(
      locator.full_path("angular.js"),
      Err(LookupError::MultipleMatches { .. })
    ));
    assert_eq!(
      locator.full_path_in("angularjs", "angular.js").unwrap(),
      format!("{ROOT}/angularjs/1.2.0/angular.js")
    );
  }

  #[test]
  fn composes_exact_paths() {
    let locator = locator();
    let expected = Some(format!("{ROOT}/bootstrap/3.1.1/css/bootstrap.css"));
    assert_eq!(locator.full_path_exact("bootstrap", "css/bootstrap.css"), expected);
    assert_eq!(locator.full_path_exact("bootstrap", "3.1.1/css/bootstrap.css"), expected);
    assert_eq!(locator.full_path_exact("bootstrap", "bootstrap.css"), None);
    assert_eq!(
      locator.full_path_exact("flat", "flat.js"),
      Some(format!("{ROOT}/flat/flat.js"))
    );
    assert_eq!(locator.full_path_exact("unknown", "a.js"), None);
  }

  #[test]
  fn splits_indexed_paths_into_coordinates() {
    let locator = locator();
    let path = format!("{ROOT}/bootstrap/3.1.1/css/bootstrap.css");
    let coordinates = locator.coordinates(&path).unwrap();
    assert_eq!(coordinates.module, "bootstrap");
    assert_eq!(coordinates.version, "3.1.1");
    assert_eq!(coordinates.relative, "css/bootstrap.css");
    assert!(locator.coordinates(&format!("{ROOT}/bootstrap/3.1.1/missing.css")).is_none());
  }

  #[test]
  fn lists_modules_and_assets() {
    let locator = locator();
    let modules = locator.modules();
    assert_eq!(modules["bootstrap"], Some("3.1.1".to_string()));
    assert_eq!(modules["flat"], None);
    assert_eq!(locator.list_assets("bootstrap/3.1.1/js").len(), 1);
    assert_eq!(locator.list_assets("").len(), 6);
  }

  #[test]
  fn first_origin_keeps_a_duplicated_path() {
    let resource = |origin: &str| EnumeratedResource {
      path: format!("{ROOT}/m/1.0/a.js"),
      origin: origin.to_string(),
      last_modified: None,
      mode: None,
    };
    let locator =
      AssetLocator::from_resources(ROOT, &[resource("mem:first"), resource("mem:second")], &BTreeMap::new());
    assert_eq!(locator.index().len(), 1);
    assert_eq!(locator.module("m").unwrap().origin, "mem:first");
  }

  #[test]
  fn scan_tags_modules_with_descriptor_groups() {
    let bundles = MemoryOrigin::new("bundles")
      .with_file(format!("{ROOT}/jquery/3.1.1/jquery.js"), b"$".to_vec())
      .with_file(format!("{ROOT}/less/2.1.0/less.js"), b"less".to_vec())
      .with_file("META-INF/maven/org.webjars/jquery/pom.properties", b"version=3.1.1\n".to_vec())
      .with_file("META-INF/maven/org.webjars/less/pom.properties", b"version=2.1.0\n".to_vec())
      .with_file("META-INF/maven/org.webjars.npm/less/pom.properties", b"version=2.1.0\n".to_vec());
    let origins = OriginSet::new().with_origin(ResourceOrigin::Memory(bundles));

    let config = LocatorConfig::default();
    let locator = AssetLocator::scan(&origins, &config).unwrap();

    assert_eq!(locator.registry().len(), 2);
    assert_eq!(locator.module("jquery").unwrap().group.as_deref(), Some("org.webjars"));
    let path = format!("{ROOT}/less/2.1.0/less.js");
    let owner = locator.owner_of(&path).unwrap();
    assert_eq!(owner.name, "less");
    assert_eq!(owner.group.as_deref(), Some("org.webjars.npm"));
    assert_eq!(owner.origin, "mem:bundles");
  }

  #[test]
  fn configured_resolver_applies_overrides() {
    let locator = AssetLocator::from_paths(
      ROOT,
      [format!("{ROOT}/m/1.0/a.js"), format!("{ROOT}/m/2.0/a.js")],
    );
    let config = LocatorConfig {
      version_overrides: vec![crate::models::DeclaredVersion::new("m", "2.0")],
      ..LocatorConfig::default()
    };
    let resolver =
      locator.configured_resolver(Arc::new(MemoryOrigin::new("empty")), &config, Vec::new());
    assert_eq!(resolver.version("m"), Some("2.0".to_string()));
    assert_eq!(locator.version_resolver().version("m"), None);
  }

  #[test]
  fn explicit_overrides_beat_configured_ones() {
    let locator = AssetLocator::from_paths(
      ROOT,
      [
        format!("{ROOT}/m/1.0/a.js"),
        format!("{ROOT}/m/2.0/a.js"),
        format!("{ROOT}/m/3.0/a.js"),
      ],
    );
    let config = LocatorConfig {
      version_overrides: vec![DeclaredVersion::new("m", "2.0")],
      ..LocatorConfig::default()
    };
    let resolver = locator.configured_resolver(
      Arc::new(MemoryOrigin::new("empty")),
      &config,
      [DeclaredVersion::new("m", "3.0")],
    );
    assert_eq!(resolver.version("m"), Some("3.0".to_string()));
    assert_eq!(resolver.full_path("m", "a.js"), Some(format!("{ROOT}/m/3.0/a.js")));
  }

  #[test]
  fn exact_lookups_do_not_grow_the_version_cache() {
    let locator = locator();
    let known = locator.version_resolver().cache().len();

    assert_eq!(locator.full_path_exact("unknown", "a.js"), None);
    assert_eq!(locator.full_path_exact("missing", "x/y.js"), None);
    assert_eq!(
      locator.full_path_exact("bootstrap", "js/bootstrap.js"),
      Some(format!("{ROOT}/bootstrap/3.1.1/js/bootstrap.js"))
    );
    assert_eq!(locator.version_resolver().cache().len(), known);
    assert_eq!(known, locator.registry().len());
  }
}
