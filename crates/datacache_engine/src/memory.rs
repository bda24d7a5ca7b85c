//! Process-local memory cache keyed by argument fingerprints.
//!
//! Records tied to a source file remember the file's modification time at
//! the moment they were cached. A lookup whose fingerprint matches but whose
//! live modification time differs is a miss, and the record is dropped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use datacache_common::{Fingerprint, FingerprintBuilder};
use parking_lot::Mutex;

use crate::error::CacheError;
use crate::staleness::modified;

/// Hit/miss counters for a [`MemoryCache`].
#[derive(Debug, Default)]
pub struct MemoryStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
}

impl MemoryStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get total misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get total inserts
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
    }
}

struct MemoryRecord<V> {
    modified: Option<SystemTime>,
    value: V,
}

/// Thread-safe map from [`Fingerprint`] to cached values.
///
/// Values are cloned out on every hit, so large values should be wrapped in
/// an `Arc`. The lock is released while a value is being computed; two
/// threads missing on the same key both compute, and the last insert wins.
pub struct MemoryCache<V> {
    entries: Mutex<HashMap<Fingerprint, MemoryRecord<V>>>,
    stats: MemoryStats,
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            stats: MemoryStats::new(),
        }
    }
}

impl<V: Clone> MemoryCache<V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`, ignoring modification times.
    pub fn get(&self, key: &Fingerprint) -> Option<V> {
        let value = self.entries.lock().get(key).map(|r| r.value.clone());
        self.count(value.is_some());
        value
    }

    /// Stores `value` under `key` with no source attached.
    pub fn set(&self, key: Fingerprint, value: V) {
        self.insert(key, None, value);
    }

    /// Returns the value stored under `key` if it was cached while `source`
    /// had its current modification time.
    pub fn get_for_source(&self, key: &Fingerprint, source: &Path) -> Result<Option<V>, CacheError> {
        let live = modified(source)?;
        let mut entries = self.entries.lock();
        let value = match entries.get(key) {
            Some(record) if record.modified == live => Some(record.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        };
        drop(entries);
        self.count(value.is_some());
        Ok(value)
    }

    /// Stores `value` under `key`, stamped with the current modification
    /// time of `source`.
    pub fn set_for_source(&self, key: Fingerprint, source: &Path, value: V) -> Result<(), CacheError> {
        let stamp = modified(source)?;
        self.insert(key, stamp, value);
        Ok(())
    }

    /// Returns the cached value for `key`, computing and storing it on a miss.
    pub fn get_or_compute<E, F>(&self, key: Fingerprint, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = compute()?;
        self.set(key, value.clone());
        Ok(value)
    }

    /// Like [`get_or_compute`](Self::get_or_compute), but the record is
    /// validated against the modification time of `source`.
    ///
    /// The stamp is taken before computing, so a source modified during the
    /// computation is picked up by the next lookup.
    pub fn get_or_compute_for_source<F>(
        &self,
        key: Fingerprint,
        source: &Path,
        compute: F,
    ) -> Result<V, CacheError>
    where
        F: FnOnce() -> Result<V, CacheError>,
    {
        if let Some(value) = self.get_for_source(&key, source)? {
            return Ok(value);
        }
        let stamp = modified(source)?;
        let value = compute()?;
        self.insert(key, stamp, value.clone());
        Ok(value)
    }

    /// Memoizes `compute` under the fingerprint of `function` and `args`.
    pub fn memoize<F>(
        &self,
        function: &str,
        args: FingerprintBuilder,
        compute: F,
    ) -> Result<V, CacheError>
    where
        F: FnOnce() -> Result<V, CacheError>,
    {
        let key = args.scoped_to(function).finish()?;
        self.get_or_compute(key, compute)
    }

    /// Discards the record under `key`, returning its value if present.
    pub fn remove(&self, key: &Fingerprint) -> Option<V> {
        self.entries.lock().remove(key).map(|record| record.value)
    }

    /// Discards every record.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if there are no records.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Hit/miss counters.
    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    fn insert(&self, key: Fingerprint, modified: Option<SystemTime>, value: V) {
        self.entries
            .lock()
            .insert(key, MemoryRecord { modified, value });
        self.stats.record_insert();
    }

    fn count(&self, hit: bool) {
        if hit {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
    }
}
