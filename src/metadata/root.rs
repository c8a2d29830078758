//! metadata::root
//!
//! The per-record anchor that owns a metadata tree.
//!
//! # Lifecycle
//!
//! A `MetadataRoot` lives as long as the record instance that holds it in
//! its [`MetadataSlot`]. Reloading the record replaces the tree in place
//! and bumps the root's generation, which marks every wrapper derived from
//! the previous tree as stale. Dropping the record drops the root; wrappers
//! still held by callers then fail to resync.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde_json::Value;

use super::binding::BindingId;
use super::wrapper::FieldWrapper;
use crate::core::codec::{Codec, CodecError};
use crate::core::tree::{RawTree, TreeError};
use crate::core::types::{FieldPath, Fingerprint};

#[derive(Debug)]
struct RootState {
    tree: RawTree,
    dirty: bool,
    /// Fingerprint of the column text last read or written.
    persisted: Option<Fingerprint>,
}

/// Owner of one record's metadata tree and its root wrapper.
pub struct MetadataRoot {
    binding: BindingId,
    this: Weak<MetadataRoot>,
    generation: Cell<u64>,
    state: RefCell<RootState>,
    wrapper: RefCell<FieldWrapper>,
}

impl MetadataRoot {
    /// Create a standalone root, not tied to any binding.
    pub fn new(tree: RawTree) -> Rc<Self> {
        Self::with_binding(tree, BindingId::STANDALONE, None)
    }

    pub(crate) fn with_binding(
        tree: RawTree,
        binding: BindingId,
        persisted: Option<Fingerprint>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| {
            let wrapper = FieldWrapper::new_root(this.clone(), 0);
            MetadataRoot {
                binding,
                this: this.clone(),
                generation: Cell::new(0),
                state: RefCell::new(RootState {
                    tree,
                    dirty: false,
                    persisted,
                }),
                wrapper: RefCell::new(wrapper),
            }
        })
    }

    /// The root wrapper for the current tree.
    pub fn wrapper(&self) -> FieldWrapper {
        self.wrapper.borrow().clone()
    }

    /// The binding this root was attached through.
    pub fn binding(&self) -> BindingId {
        self.binding
    }

    /// Number of reloads since the root was created.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// True if the tree was written since the last load or flush.
    pub fn is_dirty(&self) -> bool {
        self.state.borrow().dirty
    }

    /// Read a copy of the node at `path`.
    pub fn get(&self, path: &FieldPath) -> Option<Value> {
        self.state.borrow().tree.get(path).cloned()
    }

    /// True if a value is stored at `path`.
    pub fn contains(&self, path: &FieldPath) -> bool {
        self.state.borrow().tree.contains(path)
    }

    /// Run `f` against the current tree.
    pub fn with_tree<R>(&self, f: impl FnOnce(&RawTree) -> R) -> R {
        f(&self.state.borrow().tree)
    }

    /// A copy of the current tree.
    pub fn snapshot(&self) -> RawTree {
        self.state.borrow().tree.clone()
    }

    /// Replace the tree wholesale, as after the host reloads the record.
    ///
    /// Unflushed writes are discarded. Wrappers obtained before the reload
    /// report [`FieldWrapper::is_stale`] until they resync.
    pub fn reload(&self, tree: RawTree) {
        self.reload_persisted(tree, None);
    }

    pub(crate) fn reload_persisted(&self, tree: RawTree, persisted: Option<Fingerprint>) {
        let generation = self.generation.get() + 1;
        {
            let mut state = self.state.borrow_mut();
            state.tree = tree;
            state.dirty = false;
            state.persisted = persisted;
        }
        self.generation.set(generation);
        *self.wrapper.borrow_mut() = FieldWrapper::new_root(self.this.clone(), generation);
        tracing::debug!(binding = %self.binding, generation, "metadata tree reloaded");
    }

    /// Encode the current tree.
    pub fn encode(&self, codec: &dyn Codec) -> Result<String, CodecError> {
        codec.encode(&self.state.borrow().tree)
    }

    /// Fingerprint of the current tree under `codec`.
    pub fn fingerprint(&self, codec: &dyn Codec) -> Result<Fingerprint, CodecError> {
        Ok(Fingerprint::compute(&self.encode(codec)?))
    }

    pub(crate) fn persisted(&self) -> Option<Fingerprint> {
        self.state.borrow().persisted.clone()
    }

    pub(crate) fn mark_flushed(&self, fingerprint: Fingerprint) {
        let mut state = self.state.borrow_mut();
        state.dirty = false;
        state.persisted = Some(fingerprint);
    }

    pub(crate) fn write(&self, path: &FieldPath, value: Value) -> Result<(), TreeError> {
        let mut state = self.state.borrow_mut();
        state.tree.set(path, value)?;
        state.dirty = true;
        Ok(())
    }

    pub(crate) fn remove(&self, path: &FieldPath) -> Option<Value> {
        let mut state = self.state.borrow_mut();
        let removed = state.tree.remove(path);
        if removed.is_some() {
            state.dirty = true;
        }
        removed
    }
}

impl std::fmt::Debug for MetadataRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MetadataRoot")
            .field("binding", &self.binding)
            .field("generation", &self.generation.get())
            .field("dirty", &state.dirty)
            .field("tree", &state.tree)
            .finish()
    }
}

/// Per-record storage for an attached [`MetadataRoot`].
///
/// Hosts keep one slot per metadata field on each record instance. The
/// slot holds the only strong reference to the root.
#[derive(Default)]
pub struct MetadataSlot {
    root: RefCell<Option<Rc<MetadataRoot>>>,
}

impl MetadataSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The attached root, if any.
    pub fn get(&self) -> Option<Rc<MetadataRoot>> {
        self.root.borrow().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.root.borrow().is_some()
    }

    pub(crate) fn fill(&self, root: Rc<MetadataRoot>) {
        *self.root.borrow_mut() = Some(root);
    }

    /// Detach the root from the record.
    ///
    /// Once the returned handle is dropped, wrappers into the tree can no
    /// longer resync.
    pub fn take(&self) -> Option<Rc<MetadataRoot>> {
        self.root.borrow_mut().take()
    }
}

impl std::fmt::Debug for MetadataSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}
