//! Conversion between delimited text, in-memory tables, and the binary
//! cache format.
//!
//! The cache engine only depends on the [`TabularCodec`] trait. The
//! [`ColumnarCodec`] implementation decodes CSV/TSV text and stores tables
//! as checksummed bincode artifacts.

#![warn(missing_docs)]

pub mod binary;
pub mod error;
pub mod options;
pub mod text;

use datacache_common::Table;

pub use binary::{ColumnarCodec, ARTIFACT_EXTENSION};
pub use error::CodecError;
pub use options::DecodeOptions;

/// Converts between source text, [`Table`] values, and cache bytes.
///
/// `decode_binary` must report unreadable input as
/// [`CodecError::Corrupt`] so callers can tell a damaged cache entry apart
/// from other failures.
pub trait TabularCodec: Send + Sync {
    /// File extension (without the dot) of cache entries.
    fn extension(&self) -> &str;

    /// Parses delimited source text into a table.
    fn decode_text(&self, bytes: &[u8], options: &DecodeOptions) -> Result<Table, CodecError>;

    /// Serializes a table into the binary cache format.
    fn encode_binary(&self, table: &Table) -> Result<Vec<u8>, CodecError>;

    /// Deserializes a table from the binary cache format.
    fn decode_binary(&self, bytes: &[u8]) -> Result<Table, CodecError>;
}
