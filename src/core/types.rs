//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`FieldPath`] - Ordered segment path into a metadata tree
//! - [`Fingerprint`] - Content hash of an encoded tree for change detection
//!
//! # Validation
//!
//! Dotted paths are validated at parse time. A path built segment by
//! segment accepts any key, since mapping keys in the tree are arbitrary
//! strings (including ones containing `.`).
//!
//! # Examples
//!
//! ```
//! use metalchemy::core::types::FieldPath;
//!
//! let path = FieldPath::parse("attr.sub_attr").unwrap();
//! assert_eq!(path.len(), 2);
//! assert_eq!(path.to_string(), "attr.sub_attr");
//!
//! assert!(FieldPath::parse("attr..sub").is_err());
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from path parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path cannot be empty")]
    Empty,

    #[error("empty segment in path '{0}'")]
    EmptySegment(String),
}

/// A path into a metadata tree, one segment per mapping level.
///
/// The empty path addresses the root of the tree.
///
/// # Example
///
/// ```
/// use metalchemy::core::types::FieldPath;
///
/// let root = FieldPath::root();
/// assert!(root.is_root());
///
/// let path = root.child("a").child("b");
/// assert_eq!(path.segments(), ["a", "b"]);
/// assert_eq!(path.parent(), Some(FieldPath::root().child("a")));
/// assert_eq!(path.last(), Some("b"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// The root path (no segments).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted string such as `attr.sub_attr`.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Empty`] for an empty input and
    /// [`PathError::EmptySegment`] when two dots are adjacent or the path
    /// starts or ends with a dot. Whitespace is part of the segment name.
    pub fn parse(input: &str) -> Result<Self, PathError> {
        if input.is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments = Vec::new();
        for part in input.split('.') {
            if part.is_empty() {
                return Err(PathError::EmptySegment(input.to_string()));
            }
            segments.push(part.to_string());
        }
        Ok(Self(segments))
    }

    /// Build a path from raw segments without dotted-syntax validation.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Return a new path with `name` appended.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// The path one level up, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// The final segment, or `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True for the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Dotted form. The root renders as an empty string.
    pub fn to_dotted(&self) -> String {
        self.0.join(".")
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.to_dotted())
        }
    }
}

impl TryFrom<String> for FieldPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Ok(Self::root());
        }
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_dotted()
    }
}

impl std::str::FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Content fingerprint of an encoded metadata tree.
///
/// Used by flush to decide whether the persisted column needs rewriting.
///
/// # Example
///
/// ```
/// use metalchemy::core::types::Fingerprint;
///
/// let a = Fingerprint::compute("{\"x\":1}");
/// let b = Fingerprint::compute("{\"x\":1}");
/// assert_eq!(a, b);
/// assert_ne!(a, Fingerprint::compute("{\"x\":2}"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint from encoded tree text.
    pub fn compute(encoded: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(encoded.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Get the fingerprint as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod field_path {
        use super::*;

        #[test]
        fn parse_single_segment() {
            let path = FieldPath::parse("attr").unwrap();
            assert_eq!(path.segments(), ["attr"]);
        }

        #[test]
        fn parse_nested() {
            let path = FieldPath::parse("a.b.c").unwrap();
            assert_eq!(path.len(), 3);
            assert_eq!(path.last(), Some("c"));
        }

        #[test]
        fn parse_keeps_whitespace() {
            let path = FieldPath::parse(" a.b ").unwrap();
            assert_eq!(path.segments(), [" a", "b "]);
            assert_ne!(path, FieldPath::parse("a.b").unwrap());
        }

        #[test]
        fn empty_rejected() {
            assert_eq!(FieldPath::parse(""), Err(PathError::Empty));
        }

        #[test]
        fn empty_segment_rejected() {
            assert!(matches!(
                FieldPath::parse("a..b"),
                Err(PathError::EmptySegment(_))
            ));
            assert!(FieldPath::parse(".a").is_err());
            assert!(FieldPath::parse("a.").is_err());
        }

        #[test]
        fn from_segments_allows_dotted_keys() {
            let path = FieldPath::from_segments(["a.b", "c"]);
            assert_eq!(path.len(), 2);
            assert_eq!(path.segments()[0], "a.b");
        }

        #[test]
        fn parent_of_root_is_none() {
            assert_eq!(FieldPath::root().parent(), None);
            assert_eq!(FieldPath::root().last(), None);
        }

        #[test]
        fn parent_drops_last_segment() {
            let path = FieldPath::parse("a.b.c").unwrap();
            assert_eq!(path.parent().unwrap().to_dotted(), "a.b");
        }

        #[test]
        fn display_root() {
            assert_eq!(FieldPath::root().to_string(), "<root>");
            assert_eq!(FieldPath::root().to_dotted(), "");
        }

        #[test]
        fn serde_as_dotted_string() {
            let path = FieldPath::parse("a.b").unwrap();
            let json = serde_json::to_string(&path).unwrap();
            assert_eq!(json, "\"a.b\"");
            let parsed: FieldPath = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, path);

            let root: FieldPath = serde_json::from_str("\"\"").unwrap();
            assert!(root.is_root());
        }

        #[test]
        fn from_str() {
            let path: FieldPath = "x.y".parse().unwrap();
            assert_eq!(path, FieldPath::from_segments(["x", "y"]));
        }
    }

    mod fingerprint {
        use super::*;

        #[test]
        fn deterministic() {
            assert_eq!(Fingerprint::compute("abc"), Fingerprint::compute("abc"));
        }

        #[test]
        fn hex_sha256_length() {
            let fp = Fingerprint::compute("");
            assert_eq!(fp.as_str().len(), 64);
            assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        }

        #[test]
        fn display_matches_as_str() {
            let fp = Fingerprint::compute("abc");
            assert_eq!(fp.to_string(), fp.as_str());
        }
    }
}
