//! Configuration loader describing where bundles and their descriptors live.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::enumerator::DEFAULT_MAX_DEPTH;
use crate::models::DeclaredVersion;
use crate::version::DEFAULT_VERSION_SEPARATOR;

/// File names tried, in order, by [`LocatorConfig::discover`].
pub const CONFIG_FILE_NAMES: [&str; 3] = [
    "bundle-locator.json",
    "bundle-locator.yaml",
    "bundle-locator.yml",
];

/// Discoverable configuration for locating and extracting bundled assets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Namespace root every bundle lives under.
    pub namespace_root: String,
    /// Root of the packaged build descriptors.
    pub descriptor_root: String,
    /// Publishing groups searched for descriptors, in precedence order.
    pub descriptor_groups: Vec<String>,
    /// File name of a descriptor inside `<descriptor_root>/<group>/<module>/`.
    pub descriptor_file: String,
    /// Where the extraction cache is persisted, relative to the output root when not absolute.
    pub cache_file: Option<PathBuf>,
    /// Maximum nesting followed when walking directory origins.
    pub max_directory_depth: usize,
    /// Separator between a version and its qualifier.
    pub version_separator: char,
    /// Versions registered ahead of any lookup.
    pub version_overrides: Vec<DeclaredVersion>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            namespace_root: "META-INF/resources/webjars".into(),
            descriptor_root: "META-INF/maven".into(),
            descriptor_groups: vec!["org.webjars.npm".into(), "org.webjars".into()],
            descriptor_file: "pom.properties".into(),
            cache_file: None,
            max_directory_depth: DEFAULT_MAX_DEPTH,
            version_separator: DEFAULT_VERSION_SEPARATOR,
            version_overrides: Vec::new(),
        }
    }
}

/// Errors raised while reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file from disk.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path that caused the error.
        path: PathBuf,
        /// Source I/O error.
        source: std::io::Error,
    },
    /// The JSON document is malformed.
    #[error("failed to parse {}: {source}", path.display())]
    Json {
        /// Path that caused the error.
        path: PathBuf,
        /// Source parse error.
        source: serde_json::Error,
    },
    /// The YAML document is malformed.
    #[error("failed to parse {}: {source}", path.display())]
    Yaml {
        /// Path that caused the error.
        path: PathBuf,
        /// Source parse error.
        source: serde_yaml::Error,
    },
    /// The file extension names no supported format.
    #[error("unsupported configuration format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}

impl LocatorConfig {
    /// Load the first configuration file found in `dir`.
    ///
    /// A directory without any configuration file yields the defaults; a file that exists but
    /// cannot be parsed is reported.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
            .map_or_else(|| Ok(Self::default()), |path| Self::from_path(&path))
    }

    /// Read configuration from a JSON or YAML file, chosen by extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase);
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match extension.as_deref() {
            Some("json") => serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            }),
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                    path: path.to_path_buf(),
                    source,
                })
            }
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Namespace root without a trailing slash.
    pub fn root(&self) -> &str {
        self.namespace_root.trim_end_matches('/')
    }

    /// Location of the persisted extraction cache for `output_root`.
    pub fn cache_path(&self, output_root: &Path) -> Option<PathBuf> {
        self.cache_file
            .as_ref()
            .map(|file| output_root.join(file))
    }
}
