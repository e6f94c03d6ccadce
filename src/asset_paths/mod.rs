//! Helpers for working with namespaced resource paths.
//!
//! The submodules are split by concern so that the reverse-key encoding, coordinate parsing,
//! entry filtering and version normalisation can be tested independently. Everything here is a
//! pure function over `/`-separated strings; nothing touches the filesystem.

mod bundle;
mod candidates;
mod filters;
mod reverse;

pub use bundle::{
    is_enclosed_path, make_output_key, module_prefix, split_resource_path, ResourceCoordinates,
};
pub use candidates::version_candidates;
pub use filters::should_ignore_entry;
pub use reverse::{key_matches, reverse_key, strip_leading_separator};
