//! Error types for cache operations.

use std::path::PathBuf;

use datacache_common::{FingerprintError, Shape};

/// Errors that can occur during cache operations.
///
/// A corrupt cache entry found during [`read`](crate::DiskCache::read) is
/// recovered locally by regenerating it; every other variant is returned to
/// the caller with the paths involved.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Neither the source file nor a usable cache entry exists.
    #[error("nothing to read: neither {source_path} nor {cache_path} exists")]
    NotFound {
        /// The requested source path.
        source_path: PathBuf,
        /// The cache path it maps to.
        cache_path: PathBuf,
    },

    /// A source path cannot be mapped into the cache root.
    #[error("cannot map {path} into the cache: {reason}")]
    PathResolution {
        /// The path that could not be mapped.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// A cache entry could not be decoded.
    #[error("corrupt cache entry {cache_path}: {reason}")]
    CorruptCacheEntry {
        /// The cache entry path.
        cache_path: PathBuf,
        /// Description of the decode failure.
        reason: String,
    },

    /// A freshly written cache entry did not decode to the expected shape.
    /// The entry has already been deleted.
    #[error(
        "caching {source_path} at {cache_path} failed verification: expected shape {expected}, {found}"
    )]
    CacheWriteVerification {
        /// The source that was decoded.
        source_path: PathBuf,
        /// The cache entry that failed verification.
        cache_path: PathBuf,
        /// Shape of the table decoded from the source.
        expected: Shape,
        /// What the re-read produced.
        found: String,
    },

    /// The source text could not be decoded. Nothing was cached.
    #[error("failed to decode {source_path}: {reason}")]
    SourceDecode {
        /// The source path.
        source_path: PathBuf,
        /// Description of the decode failure.
        reason: String,
    },

    /// A table could not be encoded into the binary format.
    #[error("failed to encode cache entry {cache_path}: {reason}")]
    Encode {
        /// The destination cache path.
        cache_path: PathBuf,
        /// Description of the encode failure.
        reason: String,
    },

    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Memory cache key arguments could not be fingerprinted.
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
