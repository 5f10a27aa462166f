//! DNS name parsing and canonicalization.
//!
//! `Label` is the key type used everywhere a DNS name is stored, looked up or
//! compared: in the name tree, in registry mappings and in query handling.
//! It normalizes a presentation-format name (`"Foo.Example.COM."`) down to a
//! lower-cased, dot-free-trailing list of segments so that lookups are
//! case- and trailing-dot-insensitive, matching ordinary DNS semantics.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    segments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelError(String);

impl fmt::Display for LabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid DNS name: {}", self.0)
    }
}

impl std::error::Error for LabelError {}

impl Label {
    /// Parses a presentation-format name into a canonical label.
    ///
    /// Trailing dots are stripped, the whole name is ASCII-lowercased, and
    /// the result is split on `.`. Empty names and names with an empty
    /// intermediate segment (`"a..b"`) are rejected.
    pub fn parse(name: &str) -> Result<Self, LabelError> {
        let trimmed = name.trim().trim_end_matches('.');
        if trimmed.is_empty() {
            return Err(LabelError(format!("{:?} has no segments", name)));
        }
        let segments: Vec<String> = trimmed.split('.').map(|s| s.to_ascii_lowercase()).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(LabelError(format!("{:?} contains an empty label", name)));
        }
        Ok(Label { segments })
    }

    /// The canonical dotted representation, e.g. `"foo.example.docker"`.
    pub fn idna(&self) -> String {
        self.segments.join(".")
    }

    /// Returns a fresh copy of the segment list in left-to-right order, for
    /// the tree walk to consume with repeated `Vec::pop`.
    pub(crate) fn tree_path(&self) -> Vec<String> {
        self.segments.clone()
    }

    pub fn is_wildcard(&self) -> bool {
        self.segments.first().map(|s| s == "*").unwrap_or(false)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.idna())
    }
}

impl FromStr for Label {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_trailing_dot() {
        let label = Label::parse("Foo.Example.COM.").unwrap();
        assert_eq!(label.idna(), "foo.example.com");
    }

    #[test]
    fn rejects_empty_name() {
        assert!(Label::parse("").is_err());
        assert!(Label::parse(".").is_err());
    }

    #[test]
    fn rejects_empty_intermediate_segment() {
        assert!(Label::parse("foo..bar").is_err());
    }

    #[test]
    fn tree_path_preserves_left_to_right_order() {
        let label = Label::parse("foo.docker").unwrap();
        assert_eq!(label.tree_path(), vec!["foo".to_string(), "docker".to_string()]);
    }

    #[test]
    fn detects_wildcard_prefix() {
        assert!(Label::parse("*.docker").unwrap().is_wildcard());
        assert!(!Label::parse("foo.docker").unwrap().is_wildcard());
    }
}
