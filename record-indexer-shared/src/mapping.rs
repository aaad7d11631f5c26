//! Mapping table loader.
//!
//! Mapping tables are `KEY = VALUE` text files applied to projected field
//! values. Lines starting with `;` and blank lines are skipped; an empty
//! right-hand side maps the key to the empty string; a line without the
//! delimiter is a parse error.
//!
//! Three reserved keys adjust lookup behavior:
//!
//! - `##default` — substituted when a lookup misses
//! - `##empty` — substituted when the source field is absent or empty on a
//!   scalar field
//! - `##emptyarray` — substituted as a singleton list when the source field
//!   is absent or empty on a list field

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

/// Reserved key substituted on lookup miss.
pub const DEFAULT_KEY: &str = "##default";
/// Reserved key substituted for an absent/empty scalar field.
pub const EMPTY_KEY: &str = "##empty";
/// Reserved key substituted as a singleton list for an absent/empty list
/// field.
pub const EMPTY_ARRAY_KEY: &str = "##emptyarray";

/// Errors from loading a mapping table.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Failed to read mapping file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed line {line} in mapping {name}: {content:?}")]
    MalformedLine {
        name: String,
        line: usize,
        content: String,
    },
}

/// A loaded string-to-string mapping table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingTable {
    entries: HashMap<String, String>,
}

impl MappingTable {
    /// Load a table from a `KEY = VALUE` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MappingError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&content, &name)
    }

    /// Parse table content. `name` is used in error messages only.
    pub fn parse(content: &str, name: &str) -> Result<Self, MappingError> {
        let mut entries = HashMap::new();
        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') {
                continue;
            }
            let Some(pos) = trimmed.find('=') else {
                return Err(MappingError::MalformedLine {
                    name: name.to_string(),
                    line: index + 1,
                    content: line.to_string(),
                });
            };
            let key = trimmed[..pos].trim();
            let value = trimmed[pos + 1..].trim();
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(Self { entries })
    }

    /// Build a table from literal entries.
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Map a value through the table, falling back to `##default` when the
    /// lookup misses. `None` means the value passes through unmapped.
    pub fn map(&self, value: &str) -> Option<&str> {
        self.entries
            .get(value)
            .or_else(|| self.entries.get(DEFAULT_KEY))
            .map(String::as_str)
    }

    /// The `##empty` substitution, when defined.
    pub fn empty_value(&self) -> Option<&str> {
        self.entries.get(EMPTY_KEY).map(String::as_str)
    }

    /// The `##emptyarray` substitution, when defined.
    pub fn empty_array_value(&self) -> Option<&str> {
        self.entries.get(EMPTY_ARRAY_KEY).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let table = MappingTable::parse("; comment\n\na = Apple\nb = Banana\n", "test.map").unwrap();
        assert_eq!(table.map("a"), Some("Apple"));
        assert_eq!(table.map("b"), Some("Banana"));
        assert_eq!(table.map("c"), None);
    }

    #[test]
    fn test_parse_empty_rhs_maps_to_empty_string() {
        let table = MappingTable::parse("a =\n", "test.map").unwrap();
        assert_eq!(table.map("a"), Some(""));
    }

    #[test]
    fn test_parse_missing_delimiter_is_error() {
        let err = MappingTable::parse("a = Apple\nbroken line\n", "test.map").unwrap_err();
        match err {
            MappingError::MalformedLine { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_sentinel_catches_misses() {
        let table = MappingTable::parse("a = Apple\n##default = Other\n", "test.map").unwrap();
        assert_eq!(table.map("a"), Some("Apple"));
        assert_eq!(table.map("zzz"), Some("Other"));
    }

    #[test]
    fn test_empty_sentinels() {
        let table =
            MappingTable::parse("##empty = Unknown\n##emptyarray = NoValues\n", "test.map")
                .unwrap();
        assert_eq!(table.empty_value(), Some("Unknown"));
        assert_eq!(table.empty_array_value(), Some("NoValues"));
    }

    #[test]
    fn test_from_file_missing_path() {
        let err = MappingTable::from_file("/nonexistent/path.map").unwrap_err();
        assert!(matches!(err, MappingError::Io { .. }));
    }
}
