//! metadata::wrapper
//!
//! Lazily materialized proxy nodes over a metadata tree.
//!
//! # Navigation
//!
//! [`FieldWrapper::resolve`] never fails. Asking for a child that has never
//! been written yields a placeholder: a wrapper that reports
//! `is_populated() == false`. Nothing is written to the tree until a value
//! is assigned.
//!
//! # Reads and writes
//!
//! A wrapper holds no copy of its value. Reads look the path up in the
//! owning [`MetadataRoot`]'s tree and clone only what was asked for, so
//! every wrapper for a path agrees with the tree at all times. Writes go
//! through the root; missing ancestors are created as empty mappings, so
//! every ancestor becomes populated.
//!
//! # Staleness
//!
//! A wrapper is linked when its parent chain reaches the current root
//! wrapper and each node on the way is the cached child of its parent. A
//! reload, [`FieldWrapper::detach`], or a competing wrapper adopted by
//! [`FieldWrapper::resync`] breaks the link. Stale wrappers still read the
//! current tree (detached ones read as placeholders); writes resync first.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::binding::BindingId;
use super::root::MetadataRoot;
use super::MetadataError;
use crate::core::tree::NodeKind;
use crate::core::types::{FieldPath, PathError};

struct WrapperNode {
    path: FieldPath,
    owner: Weak<MetadataRoot>,
    parent: RefCell<Weak<WrapperNode>>,
    /// Root generation the node was last linked under.
    generation: Cell<u64>,
    detached: Cell<bool>,
    children: RefCell<BTreeMap<String, FieldWrapper>>,
}

/// A proxy for one path in a record's metadata tree.
///
/// Cloning a `FieldWrapper` is cheap and yields a handle to the same node.
#[derive(Clone)]
pub struct FieldWrapper {
    node: Rc<WrapperNode>,
}

impl FieldWrapper {
    pub(crate) fn new_root(owner: Weak<MetadataRoot>, generation: u64) -> Self {
        Self::new_node(FieldPath::root(), owner, Weak::new(), generation)
    }

    fn new_node(
        path: FieldPath,
        owner: Weak<MetadataRoot>,
        parent: Weak<WrapperNode>,
        generation: u64,
    ) -> Self {
        Self {
            node: Rc::new(WrapperNode {
                path,
                owner,
                parent: RefCell::new(parent),
                generation: Cell::new(generation),
                detached: Cell::new(false),
                children: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// The child wrapper named `name`.
    ///
    /// Returns the cached child if one was materialized before; otherwise
    /// creates and caches it. Never mutates the tree.
    pub fn resolve(&self, name: impl AsRef<str>) -> FieldWrapper {
        let name = name.as_ref();
        if let Some(child) = self.cached_child(name) {
            return child;
        }

        let path = self.node.path.child(name);
        let generation = self
            .node
            .owner
            .upgrade()
            .map_or(self.node.generation.get(), |root| root.generation());
        tracing::trace!(path = %path, "materialized wrapper");

        let child = Self::new_node(
            path,
            self.node.owner.clone(),
            Rc::downgrade(&self.node),
            generation,
        );
        self.node
            .children
            .borrow_mut()
            .insert(name.to_string(), child.clone());
        child
    }

    /// Resolve each segment of `path` in turn, relative to this wrapper.
    pub fn resolve_path(&self, path: &FieldPath) -> FieldWrapper {
        path.segments()
            .iter()
            .fold(self.clone(), |current, segment| current.resolve(segment))
    }

    /// Resolve a dotted path such as `attr.sub_attr`.
    ///
    /// Segments are taken verbatim, whitespace included.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] only if `dotted` is malformed.
    pub fn at(&self, dotted: &str) -> Result<FieldWrapper, PathError> {
        Ok(self.resolve_path(&FieldPath::parse(dotted)?))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// A copy of the value at this path, or `None` for a placeholder.
    pub fn get_value(&self) -> Option<Value> {
        self.readable_root()?.get(&self.node.path)
    }

    /// Deserialize the value at this path into `T`.
    ///
    /// Returns `Ok(None)` for a placeholder.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<Option<T>, MetadataError> {
        let Some(root) = self.readable_root() else {
            return Ok(None);
        };
        root.with_tree(|tree| {
            tree.get(&self.node.path)
                .map(|value| T::deserialize(value))
                .transpose()
        })
        .map_err(|e| MetadataError::Conversion {
            path: self.node.path.clone(),
            message: e.to_string(),
        })
    }

    /// True if a value is stored at this path, however falsy it is.
    pub fn is_populated(&self) -> bool {
        self.readable_root()
            .is_some_and(|root| root.contains(&self.node.path))
    }

    /// Kind of the node at this path.
    pub fn kind(&self) -> NodeKind {
        match self.readable_root() {
            Some(root) => root.with_tree(|tree| NodeKind::of_option(tree.get(&self.node.path))),
            None => NodeKind::Absent,
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store `value` at this wrapper's path.
    ///
    /// # Errors
    ///
    /// - [`MetadataError::Tree`] if an ancestor holds a scalar or sequence;
    ///   nothing is written
    /// - [`MetadataError::StaleReference`] if the owning record is gone
    pub fn set(&self, value: impl Into<Value>) -> Result<(), MetadataError> {
        let root = self.linked_root()?;
        root.write(&self.node.path, value.into())?;
        tracing::debug!(path = %self.node.path, "metadata value written");
        Ok(())
    }

    /// Serialize `value` with serde and store it at this wrapper's path.
    pub fn set_serialized<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), MetadataError> {
        let value = serde_json::to_value(value).map_err(|e| MetadataError::Conversion {
            path: self.node.path.clone(),
            message: e.to_string(),
        })?;
        self.set(value)
    }

    /// Store `value` at the child `name`.
    pub fn set_child(&self, name: impl AsRef<str>, value: impl Into<Value>) -> Result<(), MetadataError> {
        self.resolve(name).set(value)
    }

    /// Remove the value at this path, turning the wrapper back into a
    /// placeholder. Returns the removed value.
    ///
    /// Removing at the root empties the tree.
    pub fn remove(&self) -> Result<Option<Value>, MetadataError> {
        let root = self.linked_root()?;
        let removed = root.remove(&self.node.path);
        if removed.is_some() {
            tracing::debug!(path = %self.node.path, "metadata value removed");
        }
        Ok(removed)
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Name of this wrapper's segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.node.path.last()
    }

    /// Full path from the root.
    pub fn path(&self) -> &FieldPath {
        &self.node.path
    }

    pub fn is_root(&self) -> bool {
        self.node.path.is_root()
    }

    /// The parent wrapper, if the link is intact.
    pub fn parent(&self) -> Option<FieldWrapper> {
        self.node
            .parent
            .borrow()
            .upgrade()
            .map(|node| FieldWrapper { node })
    }

    /// Names of the children materialized so far.
    pub fn children(&self) -> Vec<String> {
        self.node.children.borrow().keys().cloned().collect()
    }

    /// The owning root, if the record is still alive.
    pub fn owner(&self) -> Option<Rc<MetadataRoot>> {
        self.node.owner.upgrade()
    }

    /// The binding the owning root belongs to.
    pub fn binding(&self) -> Option<BindingId> {
        self.owner().map(|root| root.binding())
    }

    /// Root generation the wrapper was last linked under.
    pub fn generation(&self) -> u64 {
        self.node.generation.get()
    }

    /// True if both handles point at the same node.
    pub fn ptr_eq(&self, other: &FieldWrapper) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    // =========================================================================
    // Staleness and resync
    // =========================================================================

    /// True if the wrapper is no longer linked into the current wrapper
    /// tree: the owner is gone, the record was reloaded, the wrapper was
    /// detached, or another wrapper took its place in a parent's cache.
    pub fn is_stale(&self) -> bool {
        let Some(root) = self.node.owner.upgrade() else {
            return true;
        };
        if self.node.detached.get() || self.node.generation.get() != root.generation() {
            return true;
        }
        !self.is_linked_to(&root.wrapper())
    }

    /// Break the parent link and hide the value until the next resync.
    ///
    /// The wrapper keeps its path and owner, so [`resync`](Self::resync)
    /// can rebuild both.
    pub fn detach(&self) {
        *self.node.parent.borrow_mut() = Weak::new();
        self.node.detached.set(true);
    }

    /// Rebuild the parent chain by walking the owning root's wrapper tree
    /// down this wrapper's path.
    ///
    /// Ancestors are materialized (and repaired) as needed, and this wrapper
    /// becomes the cached child of its parent. A different wrapper cached at
    /// the same path loses its parent link and reports stale from then on.
    /// A root wrapper replaced by a reload cannot be re-linked; it keeps
    /// reading and writing the current tree but stays stale.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::StaleReference`] if the owning root has been
    /// dropped.
    pub fn resync(&self) -> Result<(), MetadataError> {
        let root = self
            .node
            .owner
            .upgrade()
            .ok_or_else(|| MetadataError::StaleReference {
                path: self.node.path.clone(),
            })?;

        let Some((last, ancestors)) = self.node.path.segments().split_last() else {
            self.node.detached.set(false);
            self.node.generation.set(root.generation());
            return Ok(());
        };

        let mut current = root.wrapper();
        for segment in ancestors {
            let next = current.resolve(segment);
            next.relink(&current, &root);
            current = next;
        }

        self.relink(&current, &root);
        let displaced = current
            .node
            .children
            .borrow_mut()
            .insert(last.clone(), self.clone());
        if let Some(displaced) = displaced.filter(|other| !other.ptr_eq(self)) {
            *displaced.node.parent.borrow_mut() = Weak::new();
            tracing::debug!(path = %self.node.path, "displaced cached wrapper");
        }

        tracing::debug!(
            path = %self.node.path,
            generation = root.generation(),
            "wrapper resynchronized"
        );
        Ok(())
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn cached_child(&self, name: &str) -> Option<FieldWrapper> {
        self.node.children.borrow().get(name).cloned()
    }

    fn relink(&self, parent: &FieldWrapper, root: &MetadataRoot) {
        *self.node.parent.borrow_mut() = Rc::downgrade(&parent.node);
        self.node.detached.set(false);
        self.node.generation.set(root.generation());
    }

    fn readable_root(&self) -> Option<Rc<MetadataRoot>> {
        if self.node.detached.get() {
            return None;
        }
        self.node.owner.upgrade()
    }

    /// Walk parent links up to `top`, requiring each node to be the cached
    /// child of its parent.
    fn is_linked_to(&self, top: &FieldWrapper) -> bool {
        let mut node = Rc::clone(&self.node);
        loop {
            if node.path.is_root() {
                return Rc::ptr_eq(&node, &top.node);
            }
            let parent = node.parent.borrow().upgrade();
            let Some(parent) = parent else {
                return false;
            };
            let cached = match node.path.last() {
                Some(name) => parent
                    .children
                    .borrow()
                    .get(name)
                    .is_some_and(|child| Rc::ptr_eq(&child.node, &node)),
                None => false,
            };
            if !cached {
                return false;
            }
            node = parent;
        }
    }

    /// The owning root, resyncing first if the wrapper is stale.
    fn linked_root(&self) -> Result<Rc<MetadataRoot>, MetadataError> {
        if self.is_stale() {
            self.resync()?;
        }
        self.node
            .owner
            .upgrade()
            .ok_or_else(|| MetadataError::StaleReference {
                path: self.node.path.clone(),
            })
    }
}

impl std::fmt::Debug for FieldWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldWrapper")
            .field("path", &self.node.path)
            .field("generation", &self.node.generation.get())
            .field("detached", &self.node.detached.get())
            .finish()
    }
}

impl std::fmt::Display for FieldWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get_value() {
            Some(value) => write!(f, "{} = {}", self.node.path, value),
            None => write!(f, "{} (absent)", self.node.path),
        }
    }
}
