//! Reading identifiers and versions out of files packaged alongside a module.

use regex::Regex;
use serde_json::Value;

/// Extract the top-level `name` field of a package descriptor such as `package.json`.
///
/// Anything that is not a JSON object with a non-empty string `name` at its root yields
/// `None`; nested `name` fields (for example inside `repository`) are ignored.
pub fn parse_manifest_id(bytes: &[u8]) -> Option<String> {
  let value: Value = serde_json::from_slice(bytes).ok()?;
  let name = value.as_object()?.get("name")?.as_str()?.trim();
  (!name.is_empty()).then(|| name.to_string())
}

/// Read the `version` property out of a Java-style properties document.
pub fn parse_properties_version(text: &str) -> Option<String> {
  text
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
    .filter_map(|line| {
      let split = line.find(['=', ':'])?;
      Some((line[..split].trim(), line[split + 1..].trim()))
    })
    .find(|(key, _)| *key == "version")
    .map(|(_, value)| value.to_string())
    .filter(|value| !value.is_empty())
}

/// Matches descriptor paths of the form `<root>/<group>/<module>/<file>`.
#[derive(Debug, Clone)]
pub struct DescriptorPattern {
  pattern: Regex,
}

impl DescriptorPattern {
  /// Pattern for descriptors named `file_name` below `descriptor_root`.
  pub fn new(descriptor_root: &str, file_name: &str) -> Result<Self, regex::Error> {
    let pattern = Regex::new(&format!(
      r"^{}/([^/]+)/([^/]+)/{}$",
      regex::escape(descriptor_root.trim_end_matches('/')),
      regex::escape(file_name)
    ))?;
    Ok(Self { pattern })
  }

  /// `(group, module)` of a descriptor path, or `None` when the path is not a descriptor.
  pub fn coordinates<'a>(&self, path: &'a str) -> Option<(&'a str, &'a str)> {
    let captures = self.pattern.captures(path)?;
    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
  }

  /// Whether `path` names a descriptor.
  pub fn is_match(&self, path: &str) -> bool {
    self.pattern.is_match(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_top_level_name() {
    let json = br#"{"repository": {"name": "nested"}, "name": "less", "version": "1.0"}"#;
    assert_eq!(parse_manifest_id(json), Some("less".to_string()));
  }

  #[test]
  fn ignores_nested_names_and_bad_documents() {
    assert_eq!(parse_manifest_id(br#"{"repository": {"name": "nested"}}"#), None);
    assert_eq!(parse_manifest_id(br#"["name"]"#), None);
    assert_eq!(parse_manifest_id(b"not json"), None);
    assert_eq!(parse_manifest_id(br#"{"name": "  "}"#), None);
    assert_eq!(parse_manifest_id(br#"{"name": 5}"#), None);
  }

  #[test]
  fn reads_version_property() {
    let text = "#Generated by Maven\n#Mon Jan 01\nversion=2.1.0-1\ngroupId=org.webjars\nartifactId=jquery\n";
    assert_eq!(parse_properties_version(text), Some("2.1.0-1".to_string()));
    assert_eq!(parse_properties_version("version : 3.1.1"), Some("3.1.1".to_string()));
    assert_eq!(parse_properties_version("# version=1\nname=x"), None);
    assert_eq!(parse_properties_version("version="), None);
  }

  #[test]
  fn parses_descriptor_coordinates() {
    let pattern = DescriptorPattern::new("META-INF/maven", "pom.properties").unwrap();
    assert_eq!(
      pattern.coordinates("META-INF/maven/org.webjars.npm/less/pom.properties"),
      Some(("org.webjars.npm", "less"))
    );
    assert!(!pattern.is_match("META-INF/maven/org.webjars/less/pom.xml"));
    assert!(!pattern.is_match("META-INF/maven/less/pom.properties"));
  }
}
