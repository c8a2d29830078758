//! metadata
//!
//! Lazy, path-navigable proxies over a record's metadata tree.
//!
//! # Modules
//!
//! - [`wrapper`] - `FieldWrapper`, the lazily materialized proxy node
//! - [`root`] - `MetadataRoot`, the per-record anchor owning the tree
//! - [`binding`] - `bind`, descriptors, and the host load/flush bridge
//!
//! # Ownership
//!
//! A record owns its `MetadataRoot` through a [`MetadataSlot`]. The root
//! owns the tree and the root wrapper; each wrapper owns its materialized
//! children. Children reach their parent and the root only through `Weak`
//! references, so dropping the record releases everything. A wrapper that
//! outlives its chain (or a reload) is repaired with
//! [`FieldWrapper::resync`].
//!
//! # Threading
//!
//! Everything here is single-threaded per record: the types are built on
//! `Rc`/`RefCell` and are neither `Send` nor `Sync`. Hosts that move
//! records between threads must do so with the whole record, under their
//! own synchronization.
//!
//! # Example
//!
//! ```
//! use metalchemy::core::tree::RawTree;
//! use metalchemy::metadata::MetadataRoot;
//!
//! let root = MetadataRoot::new(RawTree::new());
//! let meta = root.wrapper();
//!
//! let field = meta.resolve("attr").resolve("sub_attr");
//! assert!(!field.is_populated());
//!
//! field.set(10).unwrap();
//! assert!(meta.resolve("attr").is_populated());
//! assert_eq!(meta.at("attr.sub_attr").unwrap().get_value(), Some(10.into()));
//! ```

pub mod binding;
pub mod root;
pub mod wrapper;

pub use binding::{bind, bind_with_codec, BindingId, MetadataBinding, MetadataDescriptor, RecordHooks};
pub use root::{MetadataRoot, MetadataSlot};
pub use wrapper::FieldWrapper;

use thiserror::Error;

use crate::core::codec::CodecError;
use crate::core::config::ConfigError;
use crate::core::tree::TreeError;
use crate::core::types::{FieldPath, PathError};

/// Errors from metadata operations.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The wrapper has outlived the record that owned its tree.
    #[error("stale reference: no metadata root is reachable for '{path}'")]
    StaleReference { path: FieldPath },

    /// A stored value could not be converted to or from the requested type.
    #[error("failed to convert value at '{path}': {message}")]
    Conversion { path: FieldPath, message: String },

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("path error: {0}")]
    Path(#[from] PathError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The host's storage failed to read or write the column.
    #[error("host storage failed for column '{column}': {source}")]
    Host {
        column: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tree::NodeKind;

    #[test]
    fn error_display() {
        let err = MetadataError::StaleReference {
            path: FieldPath::parse("attr.sub_attr").unwrap(),
        };
        assert!(err.to_string().contains("stale"));
        assert!(err.to_string().contains("attr.sub_attr"));

        let err: MetadataError = TreeError::TypeMismatch {
            path: FieldPath::parse("a").unwrap(),
            found: NodeKind::Scalar,
        }
        .into();
        assert!(err.to_string().contains("tree error"));

        let err: MetadataError = CodecError::Malformed("eof".into()).into();
        assert!(err.to_string().contains("eof"));
    }
}
