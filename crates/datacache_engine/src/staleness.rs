//! Cache entry freshness checks based on modification times.

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::error::CacheError;

/// Verdict on a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The cache entry does not exist.
    Missing,
    /// The entry can be served.
    Fresh,
    /// The source was modified after the entry was written.
    SourceNewer,
    /// The source does not exist and the entry is older than the age
    /// tolerance.
    Expired,
}

impl Freshness {
    /// Returns `true` unless the entry is [`Freshness::Fresh`].
    pub fn is_outdated(self) -> bool {
        self != Freshness::Fresh
    }
}

/// Decides whether a cache entry must be regenerated.
///
/// With a source file present, the entry is outdated only when the source
/// is strictly newer; equal timestamps count as fresh. Without a source
/// file, the entry is outdated once its age exceeds the tolerance, so a
/// zero tolerance expires every cache-only entry immediately.
#[derive(Debug, Clone, Copy)]
pub struct StalenessOracle {
    age_tolerance: Duration,
}

impl StalenessOracle {
    /// Creates an oracle with the given age tolerance.
    pub fn new(age_tolerance: Duration) -> Self {
        Self { age_tolerance }
    }

    /// The age tolerance for cache-only entries.
    pub fn age_tolerance(&self) -> Duration {
        self.age_tolerance
    }

    /// Returns `true` if the entry at `cache` must be regenerated.
    pub fn is_outdated(&self, source: &Path, cache: &Path) -> Result<bool, CacheError> {
        Ok(self.check(source, cache)?.is_outdated())
    }

    /// Classifies the entry at `cache` against `source` as of now.
    pub fn check(&self, source: &Path, cache: &Path) -> Result<Freshness, CacheError> {
        self.check_at(source, cache, SystemTime::now())
    }

    /// Classifies the entry at `cache` against `source` as of `now`.
    pub fn check_at(
        &self,
        source: &Path,
        cache: &Path,
        now: SystemTime,
    ) -> Result<Freshness, CacheError> {
        let Some(cache_mtime) = modified(cache)? else {
            return Ok(Freshness::Missing);
        };

        match modified(source)? {
            Some(source_mtime) if source_mtime > cache_mtime => Ok(Freshness::SourceNewer),
            Some(_) => Ok(Freshness::Fresh),
            None => {
                // An entry stamped in the future has age zero.
                let age = now.duration_since(cache_mtime).unwrap_or(Duration::ZERO);
                if age > self.age_tolerance {
                    Ok(Freshness::Expired)
                } else {
                    Ok(Freshness::Fresh)
                }
            }
        }
    }
}

/// Modification time of `path`, or `None` if it does not exist.
pub(crate) fn modified(path: &Path) -> Result<Option<SystemTime>, CacheError> {
    match std::fs::metadata(path) {
        Ok(meta) => meta
            .modified()
            .map(Some)
            .map_err(|e| CacheError::io(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::io(path, e)),
    }
}
