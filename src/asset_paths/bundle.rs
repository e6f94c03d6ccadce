/// Module and version segments parsed out of a full resource path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCoordinates<'a> {
    /// First segment below the namespace root.
    pub module: &'a str,
    /// Segment immediately after the module name.
    pub version: &'a str,
    /// Remaining path inside the module version directory.
    pub relative: &'a str,
}

/// Split `<root>/<module>/<version>/<relative>` into its coordinates.
///
/// Paths outside the root, or without at least one segment after the version, are not legal
/// bundle paths and produce `None`.
pub fn split_resource_path<'a>(root: &str, path: &'a str) -> Option<ResourceCoordinates<'a>> {
    let rest = path.strip_prefix(root)?.strip_prefix('/')?;
    let mut parts = rest.splitn(3, '/');
    let module = parts.next().filter(|value| !value.is_empty())?;
    let version = parts.next().filter(|value| !value.is_empty())?;
    let relative = parts.next().filter(|value| !value.is_empty())?;
    Some(ResourceCoordinates {
        module,
        version,
        relative,
    })
}

/// Prefix shared by every resource path of `module`, including the trailing slash.
pub fn module_prefix(root: &str, module: &str) -> String {
    format!("{}/{}/", root.trim_end_matches('/'), module)
}

/// Produce the output key of an extracted file relative to the output root.
///
/// The key always uses forward slashes so it is stable across platforms and can be written to
/// the persisted cache verbatim.
pub fn make_output_key(folder: &str, relative_path: &str) -> String {
    format!("{}/{}", folder, relative_path).replace('\\', "/")
}

/// Whether `path` is a plain `/`-separated relative path that stays below whatever it is
/// joined onto.
///
/// Empty, `.` and `..` segments, backslashes and drive or scheme prefixes are all refused, so
/// an archive entry or manifest id can never address a file outside the output root.
pub fn is_enclosed_path(path: &str) -> bool {
    !path.is_empty()
        && !path.contains(['\\', ':'])
        && path
            .split('/')
            .all(|segment| !matches!(segment, "" | "." | ".."))
}
