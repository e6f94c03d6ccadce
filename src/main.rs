use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use bundle_locator::{
  AssetLocator, DeclaredVersion, ExtractionCache, Extractor, FileSystemCache, LocatorConfig,
  ModuleSelection, OriginSet, DEFAULT_SELECTION_FILE, prune_stale,
};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Locate and extract files packaged in versioned asset bundles.
#[derive(Parser)]
#[command(name = "bundle-locator", version, about)]
struct Cli {
  /// Configuration file (defaults to bundle-locator.json/.yaml/.yml in the working directory)
  #[arg(long, global = true)]
  config: Option<PathBuf>,
  /// Directory or archive to read bundles from; may be repeated
  #[arg(long = "origin", short = 'o', global = true)]
  origins: Vec<String>,
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Resolve a partial path to the full path of one resource
  Resolve {
    /// Partial path, e.g. `js/bootstrap.js`
    partial: String,
    /// Only consider resources of this module
    #[arg(long)]
    module: Option<String>,
    /// Treat the path as exact and relative to the module version directory
    #[arg(long, requires = "module")]
    exact: bool,
  },
  /// List every resource below a prefix
  List {
    /// Prefix relative to the namespace root, or a full path prefix
    #[arg(default_value = "")]
    prefix: String,
  },
  /// List modules and their inferred versions
  Modules,
  /// Print the resolved version of a module
  Version {
    /// Module name
    module: String,
    /// Register `module=version` ahead of the lookup
    #[arg(long = "override", value_parser = parse_override)]
    overrides: Vec<DeclaredVersion>,
  },
  /// Copy module resources into a directory
  Extract {
    /// Output directory
    #[arg(long)]
    out: PathBuf,
    /// Only extract these modules
    #[arg(long = "module")]
    modules: Vec<String>,
    /// Skip these modules
    #[arg(long = "exclude")]
    excludes: Vec<String>,
    /// JSON file with `include` and `exclude` module lists, merged with the flags above
    /// (defaults to modules.local.json next to the output directory)
    #[arg(long)]
    selection: Option<PathBuf>,
    /// Name output folders after the `name` field of this manifest, skipping modules without it
    #[arg(long)]
    manifest: Option<String>,
    /// Cache file used for incremental extraction
    #[arg(long)]
    cache: Option<PathBuf>,
    /// Delete files extracted by the previous run that this run no longer produced
    #[arg(long)]
    prune: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let config = load_config(cli.config.as_deref())?;
  if cli.origins.is_empty() {
    bail!("no origins given; pass at least one --origin directory or archive");
  }
  let origins = Arc::new(
    OriginSet::from_specs(&cli.origins, config.max_directory_depth)
      .context("failed to open origins")?,
  );
  let locator = AssetLocator::scan(origins.as_ref(), &config).context("failed to scan origins")?;
  info!(
    modules = locator.registry().len(),
    resources = locator.index().len(),
    "indexed bundles"
  );

  match cli.command {
    Command::Resolve {
      partial,
      module,
      exact,
    } => {
      let path = match (module, exact) {
        (Some(module), true) => locator
          .full_path_exact(&module, &partial)
          .ok_or_else(|| anyhow!("{partial} does not exist in module {module}"))?,
        (Some(module), false) => locator.full_path_in(&module, &partial)?,
        (None, _) => locator.full_path(&partial)?,
      };
      if let Some(coordinates) = locator.coordinates(&path) {
        info!(
          module = coordinates.module,
          version = coordinates.version,
          "resolved resource"
        );
      }
      println!("{path}");
    }
    Command::List { prefix } => {
      for path in locator.list_assets(&prefix) {
        println!("{path}");
      }
    }
    Command::Modules => {
      for info in locator.registry().iter() {
        let version = info.version.as_deref().unwrap_or("-");
        match &info.group {
          Some(group) => println!("{}\t{}\t{}", info.name, version, group),
          None => println!("{}\t{}", info.name, version),
        }
      }
    }
    Command::Version { module, overrides } => {
      let resolver = locator.configured_resolver(origins.clone(), &config, overrides);
      match resolver.version(&module) {
        Some(version) => println!("{version}"),
        None => bail!("no version found for module {module}"),
      }
    }
    Command::Extract {
      out,
      modules,
      excludes,
      selection,
      manifest,
      cache,
      prune,
    } => {
      let cache = match cache.or_else(|| config.cache_path(&out)) {
        Some(path) => FileSystemCache::open(path),
        None => FileSystemCache::in_memory(),
      };
      let selection_path = selection.unwrap_or_else(|| {
        out
          .parent()
          .unwrap_or_else(|| Path::new(""))
          .join(DEFAULT_SELECTION_FILE)
      });
      let selection = ModuleSelection::load_from_path(&selection_path)
        .with_context(|| format!("failed to load module selection {}", selection_path.display()))?
        .with_lists(modules, excludes);
      let extractor = Extractor::new(&locator, origins.as_ref(), &cache);
      let report = extractor
        .extract(&selection, manifest.as_deref(), &out)
        .with_context(|| format!("failed to extract into {}", out.display()))?;

      let stale: BTreeSet<PathBuf> = extractor.stale_files(&out);
      if prune {
        let removed = prune_stale(&out, &stale)
          .with_context(|| format!("failed to prune {}", out.display()))?;
        info!(removed, "pruned stale files");
      } else {
        for path in &stale {
          warn!(path = %path.display(), "stale file from a previous extraction");
        }
      }
      cache.persist().context("failed to persist extraction cache")?;

      for key in &report.copied {
        println!("{key}");
      }
      if !report.is_success() {
        bail!("{} file(s) could not be extracted", report.failures.len());
      }
    }
  }

  Ok(())
}

fn init_logging(verbose: bool) {
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
  let stderr_layer = fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false);
  tracing_subscriber::registry()
    .with(filter)
    .with(stderr_layer)
    .init();
}

fn load_config(path: Option<&Path>) -> Result<LocatorConfig> {
  match path {
    Some(path) => LocatorConfig::from_path(path)
      .with_context(|| format!("failed to load configuration from {}", path.display())),
    None => {
      let cwd = std::env::current_dir().context("failed to determine working directory")?;
      LocatorConfig::discover(&cwd).context("failed to load configuration")
    }
  }
}

fn parse_override(value: &str) -> Result<DeclaredVersion, String> {
  let (module, version) = value
    .split_once('=')
    .ok_or_else(|| format!("expected module=version, got `{value}`"))?;
  if module.trim().is_empty() || version.trim().is_empty() {
    return Err(format!("expected module=version, got `{value}`"));
  }
  Ok(DeclaredVersion::new(module.trim(), version.trim()))
}
