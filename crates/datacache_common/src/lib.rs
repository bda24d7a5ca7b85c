//! Shared foundational types for the datacache workspace.
//!
//! This crate provides the columnar [`Table`] value that flows through the
//! cache, content hashing for integrity checks, and argument fingerprinting
//! used to key the in-memory cache layer.

#![warn(missing_docs)]

pub mod fingerprint;
pub mod hash;
pub mod path;
pub mod table;

pub use fingerprint::{Fingerprint, FingerprintBuilder, FingerprintError};
pub use hash::ContentHash;
pub use path::normalize_lexically;
pub use table::{Column, ColumnData, Shape, Table, TableError};
