//! Read-through disk cache for delimited tabular files.
//!
//! [`DiskCache::read`] maps a source path to a cache entry under the
//! configured root, decides whether that entry can be trusted, and either
//! decodes it or regenerates it from the source text. [`CachedReader`] adds
//! a process-local memory layer on top, keyed by argument fingerprints and
//! source modification times.

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod memory;
pub mod path;
pub mod reader;
pub mod staleness;

pub use cache::{DiskCache, FolderScan};
pub use error::CacheError;
pub use memory::{MemoryCache, MemoryStats};
pub use path::{PathKind, PathMapper};
pub use reader::CachedReader;
pub use staleness::{Freshness, StalenessOracle};

pub use datacache_codec::{ColumnarCodec, DecodeOptions, TabularCodec};
pub use datacache_common::{Shape, Table};
pub use datacache_config::CacheSettings;
