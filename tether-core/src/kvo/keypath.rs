//! Key path parsing.

use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Sentinel key meaning "every property of this object".
pub const ALL_PROPERTIES: &str = "*";

/// A parsed, dot-separated key path borrowed from its source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath<'a> {
    source: &'a str,
    segments: SmallVec<[&'a str; 4]>,
}

impl<'a> KeyPath<'a> {
    /// Parse a key path. Empty paths and empty segments are rejected.
    pub fn parse(source: &'a str) -> Result<Self> {
        if source.is_empty() {
            return Err(Error::EmptyKeyPath);
        }
        let segments: SmallVec<[&'a str; 4]> = source.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(Error::InvalidArgument(format!(
                "key path contains an empty segment: {source:?}"
            )));
        }
        Ok(Self { source, segments })
    }

    pub fn as_str(&self) -> &'a str {
        self.source
    }

    pub fn segments(&self) -> &[&'a str] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True for a single-segment path.
    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1
    }

    pub fn first(&self) -> &'a str {
        self.segments[0]
    }

    pub fn last(&self) -> &'a str {
        self.segments[self.segments.len() - 1]
    }

    /// The segments leading to the owner of the last key.
    pub fn owner_segments(&self) -> &[&'a str] {
        &self.segments[..self.segments.len() - 1]
    }

    /// The path without its first segment, if any remains.
    pub fn tail(&self) -> Option<&'a str> {
        self.source.split_once('.').map(|(_, rest)| rest)
    }
}

/// If `path` lies strictly beneath `prefix`, the part after `prefix.`.
pub fn strip_key_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    path.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|rest| !rest.is_empty())
}

/// Join two key paths with a dot.
pub fn join(prefix: &str, rest: &str) -> String {
    let mut path = String::with_capacity(prefix.len() + rest.len() + 1);
    path.push_str(prefix);
    path.push('.');
    path.push_str(rest);
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_segments() {
        let path = KeyPath::parse("a.b.c").unwrap();
        assert_eq!(path.segments(), ["a", "b", "c"]);
        assert_eq!(path.first(), "a");
        assert_eq!(path.last(), "c");
        assert_eq!(path.owner_segments(), ["a", "b"]);
        assert_eq!(path.tail(), Some("b.c"));
        assert!(!path.is_simple());
    }

    #[test]
    fn simple_path_has_no_tail() {
        let path = KeyPath::parse("name").unwrap();
        assert!(path.is_simple());
        assert_eq!(path.tail(), None);
        assert!(path.owner_segments().is_empty());
    }

    #[test]
    fn rejects_empty_paths() {
        assert_eq!(KeyPath::parse(""), Err(Error::EmptyKeyPath));
        assert!(matches!(
            KeyPath::parse("a..b"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(KeyPath::parse(".a").is_err());
    }

    #[test]
    fn strips_prefixes_on_segment_boundaries() {
        assert_eq!(strip_key_prefix("a.b.c", "a"), Some("b.c"));
        assert_eq!(strip_key_prefix("a.b.c", "a.b"), Some("c"));
        assert_eq!(strip_key_prefix("ab.c", "a"), None);
        assert_eq!(strip_key_prefix("a", "a"), None);
    }
}
