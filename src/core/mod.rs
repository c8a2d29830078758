//! core
//!
//! Host-independent building blocks for metadata trees.
//!
//! # Modules
//!
//! - [`types`] - Strong types: FieldPath, Fingerprint
//! - [`tree`] - The raw nested mapping and path-based edits
//! - [`codec`] - Versioned column encoding
//! - [`config`] - Binding configuration schema and loading

pub mod codec;
pub mod config;
pub mod tree;
pub mod types;
