//! core::tree
//!
//! The raw metadata tree: the single source of truth for one record.
//!
//! # Node Kinds
//!
//! A node is a mapping, a sequence, a scalar (null, bool, number, string),
//! or absent. Present nodes are `serde_json::Value`s; absence is `None`.
//! The root of a tree is always a mapping.
//!
//! # Writes
//!
//! [`RawTree::set`] materializes missing intermediate segments as empty
//! mappings. The whole path is checked before anything is mutated, so a
//! write either succeeds completely or leaves the tree untouched.
//!
//! # Example
//!
//! ```
//! use metalchemy::core::tree::RawTree;
//! use metalchemy::core::types::FieldPath;
//! use serde_json::json;
//!
//! let mut tree = RawTree::new();
//! let path = FieldPath::parse("a.b.c").unwrap();
//! tree.set(&path, json!(1)).unwrap();
//!
//! assert_eq!(tree.get(&path), Some(&json!(1)));
//! assert_eq!(tree.get(&FieldPath::parse("a").unwrap()), Some(&json!({"b": {"c": 1}})));
//! assert_eq!(tree.get(&FieldPath::parse("a.x").unwrap()), None);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::types::FieldPath;

/// The kind of a node in a metadata tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Mapping,
    Sequence,
    Scalar,
    Absent,
}

impl NodeKind {
    /// Classify a present value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => NodeKind::Mapping,
            Value::Array(_) => NodeKind::Sequence,
            _ => NodeKind::Scalar,
        }
    }

    /// Classify a possibly absent value.
    pub fn of_option(value: Option<&Value>) -> Self {
        value.map_or(NodeKind::Absent, Self::of)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Mapping => "mapping",
            NodeKind::Sequence => "sequence",
            NodeKind::Scalar => "scalar",
            NodeKind::Absent => "absent",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from tree mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// A write tried to descend through a node that is not a mapping.
    #[error("cannot write below '{path}': it holds a {found}, not a mapping")]
    TypeMismatch { path: FieldPath, found: NodeKind },

    /// The root of a tree must be a mapping.
    #[error("tree root must be a mapping, found {found}")]
    RootNotMapping { found: NodeKind },
}

/// A metadata tree whose root is a mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct RawTree {
    root: Value,
}

impl RawTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// Wrap an existing value as a tree.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::RootNotMapping`] unless `value` is an object.
    pub fn from_value(value: Value) -> Result<Self, TreeError> {
        match value {
            Value::Object(_) => Ok(Self { root: value }),
            other => Err(TreeError::RootNotMapping {
                found: NodeKind::of(&other),
            }),
        }
    }

    /// Read the node at `path`, or `None` if any segment is missing or an
    /// intermediate node is not a mapping.
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        let mut node = &self.root;
        for segment in path.segments() {
            node = node.as_object()?.get(segment)?;
        }
        Some(node)
    }

    /// True if a node is stored at `path`.
    pub fn contains(&self, path: &FieldPath) -> bool {
        self.get(path).is_some()
    }

    /// Store `value` at `path`, creating missing intermediate mappings.
    ///
    /// Setting the root path replaces the whole tree and requires a mapping.
    ///
    /// # Errors
    ///
    /// - [`TreeError::TypeMismatch`] if an intermediate node is a scalar or
    ///   sequence. The tree is left unchanged.
    /// - [`TreeError::RootNotMapping`] when replacing the root with a
    ///   non-mapping value.
    pub fn set(&mut self, path: &FieldPath, value: Value) -> Result<(), TreeError> {
        let Some((last, parents)) = path.segments().split_last() else {
            *self = Self::from_value(value)?;
            return Ok(());
        };

        self.check_descent(parents)?;

        let found = NodeKind::of(&self.root);
        let Some(mut map) = self.root.as_object_mut() else {
            return Err(TreeError::RootNotMapping { found });
        };
        for (depth, segment) in parents.iter().enumerate() {
            let entry = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            map = match entry {
                Value::Object(child) => child,
                other => {
                    return Err(TreeError::TypeMismatch {
                        path: FieldPath::from_segments(&parents[..=depth]),
                        found: NodeKind::of(other),
                    })
                }
            };
        }
        map.insert(last.clone(), value);
        Ok(())
    }

    /// Remove the node at `path`, returning it.
    ///
    /// Missing intermediates are not created. Removing the root path empties
    /// the tree and returns the previous root.
    pub fn remove(&mut self, path: &FieldPath) -> Option<Value> {
        let Some((last, parents)) = path.segments().split_last() else {
            let old = std::mem::replace(&mut self.root, Value::Object(Map::new()));
            return Some(old);
        };

        let mut map = self.root.as_object_mut()?;
        for segment in parents {
            map = map.get_mut(segment)?.as_object_mut()?;
        }
        map.remove(last)
    }

    /// True if the root mapping has no entries.
    pub fn is_empty(&self) -> bool {
        self.root.as_object().map_or(true, Map::is_empty)
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Verify that every existing node along `parents` is a mapping.
    fn check_descent(&self, parents: &[String]) -> Result<(), TreeError> {
        let mut node = &self.root;
        for (depth, segment) in parents.iter().enumerate() {
            match node.as_object().and_then(|map| map.get(segment)) {
                None => return Ok(()),
                Some(child @ Value::Object(_)) => node = child,
                Some(other) => {
                    tracing::debug!(
                        path = %FieldPath::from_segments(&parents[..=depth]),
                        found = %NodeKind::of(other),
                        "write blocked by non-mapping node"
                    );
                    return Err(TreeError::TypeMismatch {
                        path: FieldPath::from_segments(&parents[..=depth]),
                        found: NodeKind::of(other),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for RawTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Value> for RawTree {
    type Error = TreeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<RawTree> for Value {
    fn from(tree: RawTree) -> Self {
        tree.root
    }
}
