//! Metalchemy - lazy, path-navigable metadata trees for persisted records
//!
//! Metalchemy lets a record carry arbitrarily nested, schema-less metadata
//! in a single serialized column. Callers navigate the tree with plain
//! attribute names; intermediate nodes spring into existence as
//! placeholders, and the first write along a path materializes every
//! missing ancestor.
//!
//! # Architecture
//!
//! - [`core`] - Field paths, the raw tree, the column codec, and binding
//!   configuration
//! - [`metadata`] - Proxy wrappers, the per-record root, and the host
//!   load/flush bridge
//!
//! # Invariants
//!
//! 1. Reading never changes the tree
//! 2. A successful write makes every ancestor of the written path a mapping
//! 3. A failed write leaves the tree unchanged
//! 4. Wrappers never keep a dropped record's tree alive

pub mod core;
pub mod metadata;
