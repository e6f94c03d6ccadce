#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod asset_paths;
pub mod cache;
pub mod config;
pub mod enumerator;
pub mod error;
pub mod extractor;
pub mod index;
pub mod locator;
pub mod manifest;
pub mod models;
pub mod registry;
pub mod selection;
pub mod version;

pub use cache::{ExtractionCache, FileSystemCache};
pub use config::{ConfigError, LocatorConfig};
pub use enumerator::{EnumerationError, OriginSet, ResourceEnumerator, ResourceOrigin};
pub use error::{LookupError, LookupResult};
pub use extractor::{ExtractFailure, ExtractReport, Extractor, prune_stale};
pub use index::PathIndex;
pub use locator::AssetLocator;
pub use models::{CacheEntry, DeclaredVersion, EnumeratedResource, ModuleInfo};
pub use registry::ModuleRegistry;
pub use selection::{DEFAULT_SELECTION_FILE, ModuleInclusion, ModuleSelection, SelectionError};
pub use version::{DescriptorVersionSource, VersionCache, VersionResolver, VersionSource};
