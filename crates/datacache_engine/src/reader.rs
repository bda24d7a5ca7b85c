//! Memory layer in front of the disk cache.

use std::path::Path;
use std::sync::Arc;

use datacache_codec::{ColumnarCodec, DecodeOptions, TabularCodec};
use datacache_common::{FingerprintBuilder, Table};
use datacache_config::CacheSettings;

use crate::cache::DiskCache;
use crate::error::CacheError;
use crate::memory::MemoryCache;

/// Serves repeated reads of the same file from memory.
///
/// Records are keyed by the source path and decode options and validated
/// against the source's modification time, or the cache entry's when the
/// source does not exist. A cache-only entry past the age tolerance is never
/// served, even if a record for it is still in memory.
pub struct CachedReader<C = ColumnarCodec> {
    disk: DiskCache<C>,
    memory: MemoryCache<Arc<Table>>,
}

impl CachedReader<ColumnarCodec> {
    /// Creates a reader over a disk cache with the default codec.
    pub fn new(settings: CacheSettings) -> Self {
        Self::from_disk(DiskCache::new(settings))
    }
}

impl<C: TabularCodec> CachedReader<C> {
    /// Wraps an existing disk cache.
    pub fn from_disk(disk: DiskCache<C>) -> Self {
        Self {
            disk,
            memory: MemoryCache::new(),
        }
    }

    /// The underlying disk cache.
    pub fn disk(&self) -> &DiskCache<C> {
        &self.disk
    }

    /// The memory layer.
    pub fn memory(&self) -> &MemoryCache<Arc<Table>> {
        &self.memory
    }

    /// Reads `source`, checking memory before the disk cache.
    pub fn read(&self, source: &Path, options: &DecodeOptions) -> Result<Arc<Table>, CacheError> {
        let key = FingerprintBuilder::for_function("CachedReader::read")
            .arg(source)
            .arg(options)
            .finish()?;

        let stamp_path = if source.exists() {
            source.to_path_buf()
        } else {
            let entry = self.disk.file_for(source, options)?;
            if self.disk.oracle().check(source, &entry)?.is_outdated() {
                self.memory.remove(&key);
                return self.disk.read(source, options).map(Arc::new);
            }
            entry
        };

        self.memory.get_or_compute_for_source(key, &stamp_path, || {
            self.disk.read(source, options).map(Arc::new)
        })
    }

    /// Drops every record in the memory layer. The disk cache is untouched.
    pub fn clear_memory(&self) {
        self.memory.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacache_common::Shape;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    #[test]
    fn second_read_comes_from_memory() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.csv");
        std::fs::write(&src, "x,y\n1,2\n").unwrap();
        let reader = CachedReader::new(CacheSettings::new(dir.path().join("c")).unwrap());

        let first = reader.read(&src, &DecodeOptions::default()).unwrap();
        let second = reader.read(&src, &DecodeOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(reader.memory().stats().hits(), 1);
    }

    #[test]
    fn options_are_part_of_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.csv");
        std::fs::write(&src, "x,y\n1,2\n").unwrap();
        let reader = CachedReader::new(CacheSettings::new(dir.path().join("c")).unwrap());

        let with_header = reader.read(&src, &DecodeOptions::default()).unwrap();
        let without_header = reader
            .read(&src, &DecodeOptions::default().without_header())
            .unwrap();
        assert_eq!(with_header.shape(), Shape::new(1, 2));
        assert_eq!(without_header.shape(), Shape::new(2, 2));
        assert_eq!(reader.memory().len(), 2);

        let again = reader.read(&src, &DecodeOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&with_header, &again));
    }

    #[test]
    fn cache_only_entry_served_from_memory() {
        let dir = tempfile::tempdir().unwrap();
        let reader = CachedReader::new(CacheSettings::new(dir.path().join("c")).unwrap());
        let dest = dir.path().join("virtual.csv");
        reader.disk().write(&Table::empty(), &dest).unwrap();

        let a = reader.read(&dest, &DecodeOptions::default()).unwrap();
        let b = reader.read(&dest, &DecodeOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn expired_cache_only_entry_leaves_memory() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CacheSettings::new(dir.path().join("c"))
            .unwrap()
            .with_age_tolerance(Duration::from_secs(2));
        let reader = CachedReader::new(settings);
        let dest = dir.path().join("virtual.csv");
        let entry = reader.disk().write(&Table::empty(), &dest).unwrap();
        File::options()
            .append(true)
            .open(&entry)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(1))
            .unwrap();

        reader.read(&dest, &DecodeOptions::default()).unwrap();
        assert_eq!(reader.memory().len(), 1);

        std::thread::sleep(Duration::from_millis(1500));
        assert!(matches!(
            reader.read(&dest, &DecodeOptions::default()),
            Err(CacheError::NotFound { .. })
        ));
        assert!(reader.memory().is_empty());
    }

    #[test]
    fn not_found_is_not_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let reader = CachedReader::new(CacheSettings::new(dir.path().join("c")).unwrap());
        let missing = dir.path().join("missing.csv");
        assert!(matches!(
            reader.read(&missing, &DecodeOptions::default()),
            Err(CacheError::NotFound { .. })
        ));
        assert!(reader.memory().is_empty());
    }
}
