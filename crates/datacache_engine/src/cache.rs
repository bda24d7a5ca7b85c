//! Read-through disk cache orchestrator.
//!
//! The `DiskCache` type ties together the path mapper, the staleness oracle
//! and the tabular codec. A read either decodes a trusted cache entry or
//! regenerates it from the source text, verifying the freshly written
//! entry before returning it.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use datacache_codec::{ColumnarCodec, DecodeOptions, TabularCodec};
use datacache_common::{FingerprintBuilder, Table};
use datacache_config::{CacheSettings, SettingsStore};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::path::{PathKind, PathMapper};
use crate::staleness::{modified, Freshness, StalenessOracle};

/// Source extensions cached by a default folder scan.
const DEFAULT_EXTENSIONS: &[&str] = &["csv", "tsv"];

/// Distinguishes temporary files written concurrently by one process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Which files a folder scan picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderScan {
    extensions: Vec<String>,
    recursive: bool,
}

impl Default for FolderScan {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().copied())
    }
}

impl FolderScan {
    /// Scans recursively for the given extensions, written with or without
    /// a leading dot.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_string())
                .collect(),
            recursive: true,
        }
    }

    /// Sets whether subdirectories are scanned.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Returns `true` if the file's extension is in the allow-list.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext))
    }
}

/// Read-through cache of decoded tables under one cache root.
///
/// Settings are captured at construction; build a new cache to pick up
/// changed settings.
pub struct DiskCache<C = ColumnarCodec> {
    settings: CacheSettings,
    mapper: PathMapper,
    oracle: StalenessOracle,
    codec: C,
}

impl DiskCache<ColumnarCodec> {
    /// Creates a cache using the default codec.
    pub fn new(settings: CacheSettings) -> Self {
        Self::with_codec(settings, ColumnarCodec::new())
    }

    /// Creates a cache from the current process-wide settings.
    pub fn from_global() -> Self {
        Self::new(SettingsStore::global().snapshot())
    }
}

impl<C: TabularCodec> DiskCache<C> {
    /// Creates a cache with a custom codec.
    pub fn with_codec(settings: CacheSettings, codec: C) -> Self {
        let mapper = PathMapper::new(settings.cache_root(), codec.extension());
        let oracle = StalenessOracle::new(settings.age_tolerance());
        Self {
            settings,
            mapper,
            oracle,
            codec,
        }
    }

    /// The settings this cache was built with.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// The codec in use.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The path mapper in use.
    pub fn mapper(&self) -> &PathMapper {
        &self.mapper
    }

    /// The staleness oracle in use.
    pub fn oracle(&self) -> &StalenessOracle {
        &self.oracle
    }

    /// Returns the cache entry path for a source file read with default
    /// options.
    pub fn file(&self, source: &Path) -> Result<PathBuf, CacheError> {
        self.mapper.resolve(source)
    }

    /// Returns the cache entry path for a source file read with `options`.
    ///
    /// Default options use the entry from [`file`](Self::file); any other
    /// options get a variant entry tagged with their fingerprint, so a table
    /// decoded one way is never served for a read asking for another.
    pub fn file_for(&self, source: &Path, options: &DecodeOptions) -> Result<PathBuf, CacheError> {
        let tag = options_tag(options)?;
        self.mapper.resolve_variant(source, tag.as_deref())
    }

    /// Returns the cache directory for `path`, guessing whether it is a
    /// file or directory. See [`PathKind::infer`].
    pub fn dir(&self, path: &Path) -> Result<PathBuf, CacheError> {
        self.mapper.dir(path)
    }

    /// Returns the cache directory for `path` treated as `kind`.
    pub fn dir_as(&self, path: &Path, kind: PathKind) -> Result<PathBuf, CacheError> {
        self.mapper.dir_as(path, kind)
    }

    /// Returns `true` if a default-options cache entry exists for `source`,
    /// fresh or not.
    pub fn is_cached(&self, source: &Path) -> Result<bool, CacheError> {
        Ok(self.file(source)?.exists())
    }

    /// Returns `true` if a cache entry for `source` read with `options`
    /// exists, fresh or not.
    pub fn is_cached_with(&self, source: &Path, options: &DecodeOptions) -> Result<bool, CacheError> {
        Ok(self.file_for(source, options)?.exists())
    }

    /// Reads a table, serving it from the cache when the entry is fresh and
    /// regenerating the entry from `source` otherwise.
    ///
    /// A corrupt entry is discarded and regenerated. Fails with
    /// [`CacheError::NotFound`] when there is no source to regenerate from
    /// and no usable entry.
    pub fn read(&self, source: &Path, options: &DecodeOptions) -> Result<Table, CacheError> {
        let cache_path = self.file_for(source, options)?;

        match self.oracle.check(source, &cache_path)? {
            Freshness::Fresh => match self.load(&cache_path) {
                Ok(table) => {
                    debug!(source = %source.display(), cache = %cache_path.display(), "cache hit");
                    return Ok(table);
                }
                Err(CacheError::CorruptCacheEntry { reason, .. }) => {
                    warn!(
                        cache = %cache_path.display(),
                        %reason,
                        "unusable cache entry; discarding and re-creating"
                    );
                    remove_entry(&cache_path)?;
                }
                // Removed by a concurrent reader between the check and the load.
                Err(CacheError::Io { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            },
            Freshness::SourceNewer => {
                debug!(source = %source.display(), "source modified since cached; regenerating");
            }
            Freshness::Expired => {
                debug!(
                    cache = %cache_path.display(),
                    tolerance = ?self.oracle.age_tolerance(),
                    "cache-only entry older than age tolerance"
                );
            }
            Freshness::Missing => {
                debug!(source = %source.display(), "cache miss");
            }
        }

        if !source.is_file() {
            return Err(CacheError::NotFound {
                source_path: source.to_path_buf(),
                cache_path,
            });
        }

        self.materialize(source, &cache_path, options)
    }

    /// Writes `table` as the default-options cache entry for `destination`,
    /// overwriting any existing entry without a staleness check. Returns the
    /// entry path.
    pub fn write(&self, table: &Table, destination: &Path) -> Result<PathBuf, CacheError> {
        let cache_path = self.mapper.resolve(destination)?;
        self.store(table, &cache_path, None)?;
        debug!(
            destination = %destination.display(),
            cache = %cache_path.display(),
            shape = %table.shape(),
            "wrote cache entry"
        );
        Ok(cache_path)
    }

    /// Deletes every cache entry for `source`, including the variants
    /// written for non-default options. Returns `true` if any existed.
    pub fn invalidate(&self, source: &Path) -> Result<bool, CacheError> {
        let base = self.mapper.resolve(source)?;
        let Some(parent) = base.parent() else {
            return Ok(false);
        };
        let entries = match std::fs::read_dir(parent) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(CacheError::io(parent, e)),
        };

        let mut removed = false;
        for entry in entries {
            let path = entry.map_err(|e| CacheError::io(parent, e))?.path();
            if path == base || self.mapper.is_variant_of(&path, &base) {
                match std::fs::remove_file(&path) {
                    Ok(()) => removed = true,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(CacheError::io(path, e)),
                }
            }
        }
        Ok(removed)
    }

    /// Materializes every path that is not cached yet. Returns how many
    /// entries were created.
    pub fn cache_files<I, P>(&self, paths: I, options: &DecodeOptions) -> Result<usize, CacheError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut created = 0;
        for path in paths {
            let path = path.as_ref();
            if !self.is_cached_with(path, options)? {
                self.read(path, options)?;
                created += 1;
            }
        }
        Ok(created)
    }

    /// Like [`cache_files`](Self::cache_files), but materializes misses on
    /// the rayon thread pool. Paths mapping to the same entry count once.
    pub fn cache_files_parallel<P>(
        &self,
        paths: &[P],
        options: &DecodeOptions,
    ) -> Result<usize, CacheError>
    where
        P: AsRef<Path> + Sync,
    {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let cache_path = self.file_for(path, options)?;
            if !cache_path.exists() && seen.insert(cache_path) {
                pending.push(path);
            }
        }

        pending
            .par_iter()
            .try_for_each(|path| self.read(path, options).map(|_| ()))?;
        Ok(pending.len())
    }

    /// Caches every file under `folder` whose extension matches `scan`.
    ///
    /// Anything inside the cache root is skipped, so a cache root nested in
    /// the scanned folder never feeds back into itself.
    pub fn cache_folder(
        &self,
        folder: &Path,
        scan: &FolderScan,
        options: &DecodeOptions,
    ) -> Result<usize, CacheError> {
        let mut files = Vec::new();
        self.collect_files(folder, scan, &mut files)?;
        files.sort();

        let created = self.cache_files(&files, options)?;
        info!(
            folder = %folder.display(),
            matched = files.len(),
            created,
            "cached folder"
        );
        Ok(created)
    }

    fn collect_files(
        &self,
        dir: &Path,
        scan: &FolderScan,
        out: &mut Vec<PathBuf>,
    ) -> Result<(), CacheError> {
        let entries = std::fs::read_dir(dir).map_err(|e| CacheError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(dir, e))?;
            let path = entry.path();
            if self.inside_cache_root(&path) {
                continue;
            }
            let file_type = entry.file_type().map_err(|e| CacheError::io(&path, e))?;
            if file_type.is_dir() {
                if scan.recursive {
                    self.collect_files(&path, scan, out)?;
                }
            } else if path.is_file() && scan.matches(&path) {
                out.push(path);
            }
        }
        Ok(())
    }

    fn inside_cache_root(&self, path: &Path) -> bool {
        std::path::absolute(path).is_ok_and(|p| self.mapper.contains(&p))
    }

    /// Decodes the source text, writes the entry, and re-reads it to check
    /// that the round-trip preserved the table's shape.
    ///
    /// The entry carries the source's modification time as read before
    /// decoding, so a source rewritten while it is being cached is strictly
    /// newer than the entry and gets regenerated on the next read.
    fn materialize(
        &self,
        source: &Path,
        cache_path: &Path,
        options: &DecodeOptions,
    ) -> Result<Table, CacheError> {
        let source_mtime = modified(source)?;
        let bytes = std::fs::read(source).map_err(|e| CacheError::io(source, e))?;
        let options = options.resolved_for(source);
        let table = self
            .codec
            .decode_text(&bytes, &options)
            .map_err(|e| CacheError::SourceDecode {
                source_path: source.to_path_buf(),
                reason: e.to_string(),
            })?;
        let expected = table.shape();

        self.store(&table, cache_path, source_mtime)?;

        let found = match self.load(cache_path) {
            Ok(reread) if reread.shape() == expected => {
                debug!(
                    source = %source.display(),
                    cache = %cache_path.display(),
                    shape = %expected,
                    "materialized cache entry"
                );
                return Ok(reread);
            }
            Ok(reread) => format!("got shape {}", reread.shape()),
            Err(e) => format!("re-read failed: {e}"),
        };

        warn!(
            source = %source.display(),
            cache = %cache_path.display(),
            %expected,
            %found,
            "cache entry failed verification; deleting"
        );
        if let Err(e) = remove_entry(cache_path) {
            warn!(cache = %cache_path.display(), error = %e, "could not delete unverified entry");
        }
        Err(CacheError::CacheWriteVerification {
            source_path: source.to_path_buf(),
            cache_path: cache_path.to_path_buf(),
            expected,
            found,
        })
    }

    fn load(&self, cache_path: &Path) -> Result<Table, CacheError> {
        let bytes = std::fs::read(cache_path).map_err(|e| CacheError::io(cache_path, e))?;
        self.codec
            .decode_binary(&bytes)
            .map_err(|e| CacheError::CorruptCacheEntry {
                cache_path: cache_path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Encodes `table` into a sibling temporary file and renames it over
    /// `cache_path`, creating parent directories as needed. With `mtime`
    /// set, the entry is stamped with it instead of the write time.
    fn store(
        &self,
        table: &Table,
        cache_path: &Path,
        mtime: Option<SystemTime>,
    ) -> Result<(), CacheError> {
        let encoded = self
            .codec
            .encode_binary(table)
            .map_err(|e| CacheError::Encode {
                cache_path: cache_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if let Some(parent) = cache_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }

        let tmp = temp_path(cache_path);
        let written = std::fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(&encoded)?;
            if let Some(mtime) = mtime {
                file.set_modified(mtime)?;
            }
            Ok(())
        });
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(CacheError::io(tmp, e));
        }
        if let Err(e) = std::fs::rename(&tmp, cache_path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(CacheError::io(cache_path, e));
        }
        Ok(())
    }
}

/// Variant tag for non-default decode options.
fn options_tag(options: &DecodeOptions) -> Result<Option<String>, CacheError> {
    if *options == DecodeOptions::default() {
        return Ok(None);
    }
    let fingerprint = FingerprintBuilder::for_function("DecodeOptions")
        .arg(options)
        .finish()?;
    Ok(Some(format!("{:016x}", fingerprint.as_u128() as u64)))
}

fn remove_entry(cache_path: &Path) -> Result<(), CacheError> {
    match std::fs::remove_file(cache_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(cache_path, e)),
    }
}

fn temp_path(cache_path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = cache_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.{n}.tmp", std::process::id()));
    cache_path.with_file_name(name)
}
