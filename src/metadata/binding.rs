//! metadata::binding
//!
//! Binds the metadata system to a host persistence framework.
//!
//! # Design
//!
//! The host exposes its load/flush extension points by implementing
//! [`RecordHooks`]. [`bind`] turns those hooks into a [`MetadataBinding`];
//! the binding hands out [`MetadataDescriptor`]s, one per metadata field of
//! a record type. Each binding gets its own [`BindingId`] and carries its
//! own hooks, codec and configuration, so several independent bindings can
//! coexist in one process.
//!
//! # Record Lifecycle
//!
//! - `attach` on first access decodes the persisted column once; later
//!   calls return the attached root untouched
//! - `load` is the host's reload hook and replaces the tree in place
//! - `flush` encodes the tree and writes the column if it changed
//!
//! # Example
//!
//! ```
//! use metalchemy::core::config::BindingConfig;
//! use metalchemy::metadata::{bind, MetadataSlot, RecordHooks};
//!
//! #[derive(Default)]
//! struct Row {
//!     meta: Option<String>,
//!     slot: MetadataSlot,
//! }
//!
//! struct RowHooks;
//!
//! impl RecordHooks for RowHooks {
//!     type Record = Row;
//!     type Error = std::convert::Infallible;
//!
//!     fn load_column(&self, record: &Row, _column: &str) -> Result<Option<String>, Self::Error> {
//!         Ok(record.meta.clone())
//!     }
//!
//!     fn store_column(&self, record: &mut Row, _column: &str, encoded: String) -> Result<(), Self::Error> {
//!         record.meta = Some(encoded);
//!         Ok(())
//!     }
//!
//!     fn slot<'r>(&self, record: &'r Row, _column: &str) -> &'r MetadataSlot {
//!         &record.slot
//!     }
//! }
//!
//! let binding = bind(RowHooks, BindingConfig::default()).unwrap();
//! let meta = binding.descriptor();
//!
//! let mut row = Row::default();
//! meta.get(&row).unwrap().resolve("attr").set("hello").unwrap();
//! assert!(meta.flush(&mut row).unwrap());
//! assert!(row.meta.unwrap().contains("hello"));
//! ```

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::root::{MetadataRoot, MetadataSlot};
use super::wrapper::FieldWrapper;
use super::MetadataError;
use crate::core::codec::Codec;
use crate::core::config::{validate_column, BindingConfig};
use crate::core::tree::RawTree;
use crate::core::types::Fingerprint;

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl BindingId {
    /// Roots created directly with [`MetadataRoot::new`].
    pub const STANDALONE: BindingId = BindingId(0);

    fn next() -> Self {
        Self(NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BindingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "binding-{}", self.0)
    }
}

/// Load/flush extension points of a host persistence framework.
pub trait RecordHooks {
    /// The host's record type.
    type Record;

    /// Failure reported by the host's storage.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the persisted column; `Ok(None)` when the column is null.
    fn load_column(&self, record: &Self::Record, column: &str) -> Result<Option<String>, Self::Error>;

    /// Write encoded text to the persisted column.
    fn store_column(
        &self,
        record: &mut Self::Record,
        column: &str,
        encoded: String,
    ) -> Result<(), Self::Error>;

    /// The slot on `record` that holds the attached root for `column`.
    fn slot<'r>(&self, record: &'r Self::Record, column: &str) -> &'r MetadataSlot;
}

struct BindingInner<H> {
    id: BindingId,
    hooks: H,
    codec: Box<dyn Codec>,
    config: BindingConfig,
}

/// A metadata system bound to one host's hooks.
pub struct MetadataBinding<H: RecordHooks> {
    inner: Rc<BindingInner<H>>,
}

/// Bind to a host using the codec described by `config`.
///
/// # Errors
///
/// Returns [`MetadataError::Config`] if `config` fails validation.
pub fn bind<H: RecordHooks>(hooks: H, config: BindingConfig) -> Result<MetadataBinding<H>, MetadataError> {
    let codec = config.codec();
    bind_with_codec(hooks, config, codec)
}

/// Bind to a host with an explicit codec.
pub fn bind_with_codec<H, C>(
    hooks: H,
    config: BindingConfig,
    codec: C,
) -> Result<MetadataBinding<H>, MetadataError>
where
    H: RecordHooks,
    C: Codec + 'static,
{
    config.validate()?;
    let id = BindingId::next();
    tracing::debug!(binding = %id, column = %config.column, "metadata binding created");
    Ok(MetadataBinding {
        inner: Rc::new(BindingInner {
            id,
            hooks,
            codec: Box::new(codec),
            config,
        }),
    })
}

impl<H: RecordHooks> MetadataBinding<H> {
    pub fn id(&self) -> BindingId {
        self.inner.id
    }

    pub fn config(&self) -> &BindingConfig {
        &self.inner.config
    }

    pub fn hooks(&self) -> &H {
        &self.inner.hooks
    }

    /// Descriptor for the configured column.
    pub fn descriptor(&self) -> MetadataDescriptor<H> {
        MetadataDescriptor {
            binding: Rc::clone(&self.inner),
            column: self.inner.config.column.clone(),
        }
    }

    /// Descriptor for another column of the same record type.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Config`] if `column` is not a valid column
    /// name.
    pub fn descriptor_for(&self, column: impl Into<String>) -> Result<MetadataDescriptor<H>, MetadataError> {
        let column = column.into();
        validate_column(&column)?;
        Ok(MetadataDescriptor {
            binding: Rc::clone(&self.inner),
            column,
        })
    }
}

impl<H: RecordHooks> Clone for MetadataBinding<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Field-level accessor for one metadata column of a record type.
pub struct MetadataDescriptor<H: RecordHooks> {
    binding: Rc<BindingInner<H>>,
    column: String,
}

impl<H: RecordHooks> MetadataDescriptor<H> {
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn binding(&self) -> BindingId {
        self.binding.id
    }

    /// The root wrapper for `record`, attaching on first access.
    pub fn get(&self, record: &H::Record) -> Result<FieldWrapper, MetadataError> {
        Ok(self.attach(record)?.wrapper())
    }

    /// Attach a root to `record` unless one is already attached.
    ///
    /// Repeated calls return the same root and never touch unflushed edits.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Host`] if the host cannot read the column
    /// and [`MetadataError::Codec`] if the column cannot be decoded.
    pub fn attach(&self, record: &H::Record) -> Result<Rc<MetadataRoot>, MetadataError> {
        let slot = self.binding.hooks.slot(record, &self.column);
        if let Some(root) = slot.get() {
            return Ok(root);
        }

        let (tree, persisted) = self.decode_column(record)?;
        let root = MetadataRoot::with_binding(tree, self.binding.id, persisted);
        slot.fill(Rc::clone(&root));
        tracing::debug!(binding = %self.binding.id, column = %self.column, "metadata attached");
        Ok(root)
    }

    /// Reload hook: decode the persisted column and replace the tree.
    ///
    /// An attached root keeps its identity, so wrappers obtained earlier can
    /// resync against the reloaded tree. Unflushed edits are discarded.
    pub fn load(&self, record: &H::Record) -> Result<Rc<MetadataRoot>, MetadataError> {
        let slot = self.binding.hooks.slot(record, &self.column);
        let (tree, persisted) = self.decode_column(record)?;
        match slot.get() {
            Some(root) => {
                root.reload_persisted(tree, persisted);
                Ok(root)
            }
            None => {
                let root = MetadataRoot::with_binding(tree, self.binding.id, persisted);
                slot.fill(Rc::clone(&root));
                tracing::debug!(binding = %self.binding.id, column = %self.column, "metadata attached on load");
                Ok(root)
            }
        }
    }

    /// Flush hook: write the encoded tree to the column if it changed.
    ///
    /// Returns `true` if the column was written. Records without an
    /// attached root are left alone. If the host fails to store the column
    /// the root stays dirty and the next flush tries again.
    pub fn flush(&self, record: &mut H::Record) -> Result<bool, MetadataError> {
        let Some(root) = self.binding.hooks.slot(record, &self.column).get() else {
            return Ok(false);
        };

        let persisted = root.persisted();
        if persisted.is_none() && !root.is_dirty() {
            // Null column and no writes: keep it null.
            return Ok(false);
        }

        let encoded = root.encode(self.binding.codec.as_ref())?;
        let fingerprint = Fingerprint::compute(&encoded);
        if persisted.as_ref() == Some(&fingerprint) {
            tracing::trace!(column = %self.column, "metadata unchanged, skipping flush");
            root.mark_flushed(fingerprint);
            return Ok(false);
        }

        self.binding
            .hooks
            .store_column(record, &self.column, encoded)
            .map_err(|e| self.host_error(e))?;
        tracing::debug!(
            binding = %self.binding.id,
            column = %self.column,
            fingerprint = %fingerprint,
            "metadata flushed"
        );
        root.mark_flushed(fingerprint);
        Ok(true)
    }

    /// Detach the root from `record`.
    ///
    /// The next access decodes the column again. Wrappers into the detached
    /// tree fail to resync once the returned handle is dropped.
    pub fn discard(&self, record: &H::Record) -> Option<Rc<MetadataRoot>> {
        self.binding.hooks.slot(record, &self.column).take()
    }

    fn host_error(&self, source: H::Error) -> MetadataError {
        MetadataError::Host {
            column: self.column.clone(),
            source: Box::new(source),
        }
    }

    fn decode_column(&self, record: &H::Record) -> Result<(RawTree, Option<Fingerprint>), MetadataError> {
        let text = self
            .binding
            .hooks
            .load_column(record, &self.column)
            .map_err(|e| self.host_error(e))?;
        match text {
            None => Ok((RawTree::new(), None)),
            Some(text) => {
                let tree = self.binding.codec.decode(&text)?;
                Ok((tree, Some(Fingerprint::compute(&text))))
            }
        }
    }
}

impl<H: RecordHooks> Clone for MetadataDescriptor<H> {
    fn clone(&self) -> Self {
        Self {
            binding: Rc::clone(&self.binding),
            column: self.column.clone(),
        }
    }
}

impl<H: RecordHooks> std::fmt::Debug for MetadataDescriptor<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataDescriptor")
            .field("binding", &self.binding.id)
            .field("column", &self.column)
            .finish()
    }
}
