//! Mapping of source paths to cache paths.
//!
//! Absolute sources are placed under the cache root relative to the
//! deepest directory they share with it; relative sources are placed under
//! the root as-is. Every component is sanitized and `..` segments are
//! collapsed so the result always stays lexically inside the cache root.

use std::path::{Component, Path, PathBuf};

use datacache_common::normalize_lexically;

use crate::error::CacheError;

/// Characters stripped from path components on every platform.
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Device names that cannot be used as file names on Windows.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Longest component, in bytes, accepted by common filesystems.
const MAX_COMPONENT_LEN: usize = 255;

/// Whether a path names a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// A file; its cache directory is the parent of its cache entry.
    File,
    /// A directory; its cache directory mirrors it under the cache root.
    Directory,
}

impl PathKind {
    /// Classifies a path by looking at the filesystem.
    ///
    /// Existing files and directories are classified as such. A path that
    /// does not exist is guessed to be a file when its last component has
    /// both a stem and an extension, and a directory otherwise, so a
    /// missing directory literally named `foo.bar` is misclassified as a
    /// file. Use [`PathMapper::dir_as`] to state the intent instead.
    pub fn infer(path: &Path) -> Self {
        if path.is_file() {
            return PathKind::File;
        }
        if path.is_dir() {
            return PathKind::Directory;
        }
        if path.file_stem().is_some() && path.extension().is_some() {
            PathKind::File
        } else {
            PathKind::Directory
        }
    }
}

/// Deterministic source-path to cache-path mapping under one cache root.
#[derive(Debug, Clone)]
pub struct PathMapper {
    cache_root: PathBuf,
    extension: String,
}

impl PathMapper {
    /// Creates a mapper for an absolute cache root and the cache entry
    /// extension (without the dot). `..` segments in the root are collapsed.
    pub fn new(cache_root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            cache_root: normalize_lexically(&cache_root.into()),
            extension: extension.into(),
        }
    }

    /// The cache root.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Returns the cache entry path for a source file.
    ///
    /// The full sanitized file name is kept and the cache extension is
    /// appended, so `a.csv` and `a.tsv` map to distinct entries. The source
    /// does not need to exist.
    pub fn resolve(&self, source: &Path) -> Result<PathBuf, CacheError> {
        self.resolve_variant(source, None)
    }

    /// Like [`resolve`](Self::resolve), with an optional tag naming a
    /// variant entry: `a.csv` with tag `t` maps to `a.csv~t.<ext>`.
    pub fn resolve_variant(&self, source: &Path, tag: Option<&str>) -> Result<PathBuf, CacheError> {
        let components = self.relative_components(source)?;
        let (file_name, dirs) = components
            .split_last()
            .ok_or_else(|| CacheError::PathResolution {
                path: source.to_path_buf(),
                reason: "path has no usable file name".to_string(),
            })?;

        let mut cache_path = self.cache_root.clone();
        cache_path.extend(dirs);
        cache_path.push(match tag {
            Some(tag) => format!("{file_name}~{tag}.{}", self.extension),
            None => format!("{file_name}.{}", self.extension),
        });
        Ok(cache_path)
    }

    /// Returns `true` if `entry` is a variant of `base`, i.e. it sits next
    /// to it and is named `<name>~<tag>.<ext>`.
    pub fn is_variant_of(&self, entry: &Path, base: &Path) -> bool {
        let (Some(entry_name), Some(base_name)) = (
            entry.file_name().and_then(|n| n.to_str()),
            base.file_name().and_then(|n| n.to_str()),
        ) else {
            return false;
        };
        let suffix = format!(".{}", self.extension);
        let Some(stem) = base_name.strip_suffix(&suffix) else {
            return false;
        };
        entry.parent() == base.parent()
            && entry_name
                .strip_prefix(stem)
                .and_then(|rest| rest.strip_prefix('~'))
                .and_then(|rest| rest.strip_suffix(&suffix))
                .is_some_and(|tag| !tag.is_empty() && tag.bytes().all(|b| b.is_ascii_hexdigit()))
    }

    /// Returns the cache directory equivalent to `path`, inferring whether
    /// `path` is a file or a directory (see [`PathKind::infer`]).
    pub fn dir(&self, path: &Path) -> Result<PathBuf, CacheError> {
        self.dir_as(path, PathKind::infer(path))
    }

    /// Returns the cache directory equivalent to `path` treated as `kind`.
    pub fn dir_as(&self, path: &Path, kind: PathKind) -> Result<PathBuf, CacheError> {
        match kind {
            PathKind::File => {
                let entry = self.resolve(path)?;
                Ok(entry
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.cache_root.clone()))
            }
            PathKind::Directory => {
                let mut dir = self.cache_root.clone();
                dir.extend(self.relative_components(path)?);
                Ok(dir)
            }
        }
    }

    /// Returns `true` if `path` lies lexically inside the cache root.
    pub fn contains(&self, path: &Path) -> bool {
        path.is_absolute() && normalize_lexically(path).starts_with(&self.cache_root)
    }

    /// Sanitized components of `source` relative to the cache root.
    fn relative_components(&self, source: &Path) -> Result<Vec<String>, CacheError> {
        if source.as_os_str().is_empty() {
            return Err(CacheError::PathResolution {
                path: source.to_path_buf(),
                reason: "empty path".to_string(),
            });
        }

        if !source.is_absolute() {
            return Ok(sanitize_components(source.components()));
        }

        let normalized = normalize_lexically(source);
        let common = self
            .cache_root
            .components()
            .zip(normalized.components())
            .take_while(|(a, b)| a == b)
            .count();
        if common == 0 {
            return Err(CacheError::PathResolution {
                path: source.to_path_buf(),
                reason: format!(
                    "no common ancestor with cache root {}",
                    self.cache_root.display()
                ),
            });
        }
        Ok(sanitize_components(normalized.components().skip(common)))
    }
}

fn sanitize_components<'a>(components: impl Iterator<Item = Component<'a>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for component in components {
        match component {
            Component::Normal(name) => {
                let clean = sanitize_name(&name.to_string_lossy());
                if !clean.is_empty() {
                    out.push(clean);
                }
            }
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    out
}

/// Makes a single component safe on every supported filesystem.
///
/// Strips control and reserved characters, trims trailing dots and spaces
/// (which also empties `.`/`..` lookalikes), suffixes reserved device names
/// with `_`, and truncates to [`MAX_COMPONENT_LEN`] bytes.
fn sanitize_name(name: &str) -> String {
    let mut clean: String = name
        .chars()
        .filter(|c| !c.is_control() && !ILLEGAL_CHARS.contains(c))
        .collect();

    let trimmed_len = clean.trim_end_matches(['.', ' ']).len();
    clean.truncate(trimmed_len);
    if clean.is_empty() {
        return clean;
    }

    let stem_end = clean.find('.').unwrap_or(clean.len());
    if RESERVED_NAMES
        .iter()
        .any(|r| r.eq_ignore_ascii_case(&clean[..stem_end]))
    {
        clean.insert(stem_end, '_');
    }

    if clean.len() > MAX_COMPONENT_LEN {
        let mut cut = MAX_COMPONENT_LEN;
        while !clean.is_char_boundary(cut) {
            cut -= 1;
        }
        clean.truncate(cut);
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> PathMapper {
        PathMapper::new("/home/user/.cache/datacache", "dcache")
    }

    #[test]
    fn relative_path_under_root() {
        let p = mapper().resolve(Path::new("data/sales.csv")).unwrap();
        assert_eq!(p, PathBuf::from("/home/user/.cache/datacache/data/sales.csv.dcache"));
    }

    #[test]
    fn absolute_path_relative_to_common_ancestor() {
        let p = mapper()
            .resolve(Path::new("/home/user/projects/x/data.tsv"))
            .unwrap();
        assert_eq!(
            p,
            PathBuf::from("/home/user/.cache/datacache/projects/x/data.tsv.dcache")
        );
    }

    #[test]
    fn absolute_path_sharing_only_root() {
        let p = mapper().resolve(Path::new("/srv/data/a.csv")).unwrap();
        assert_eq!(p, PathBuf::from("/home/user/.cache/datacache/srv/data/a.csv.dcache"));
    }

    #[test]
    fn deterministic() {
        let m = mapper();
        let a = m.resolve(Path::new("x/y.csv")).unwrap();
        let b = m.resolve(Path::new("x/y.csv")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn extension_kept_in_entry_name() {
        let p = mapper().resolve(Path::new("archive.2024.csv")).unwrap();
        assert!(p.ends_with("archive.2024.csv.dcache"));
        let p = mapper().resolve(Path::new("noext")).unwrap();
        assert!(p.ends_with("noext.dcache"));
    }

    #[test]
    fn sibling_extensions_do_not_collide() {
        let m = mapper();
        let csv = m.resolve(Path::new("dir/a.csv")).unwrap();
        let tsv = m.resolve(Path::new("dir/a.tsv")).unwrap();
        let bare = m.resolve(Path::new("dir/a")).unwrap();
        assert_ne!(csv, tsv);
        assert_ne!(csv, bare);
        assert_ne!(tsv, bare);
    }

    #[test]
    fn variant_entries_sit_next_to_base() {
        let m = mapper();
        let base = m.resolve(Path::new("dir/a.csv")).unwrap();
        let variant = m
            .resolve_variant(Path::new("dir/a.csv"), Some("00ff"))
            .unwrap();
        assert!(variant.ends_with("dir/a.csv~00ff.dcache"));
        assert!(m.is_variant_of(&variant, &base));
        assert!(!m.is_variant_of(&base, &base));

        let other = m.resolve(Path::new("dir/a.csv~x.csv")).unwrap();
        assert!(!m.is_variant_of(&other, &base));
    }

    #[test]
    fn relative_traversal_stays_inside_root() {
        let m = mapper();
        for source in [
            "../../etc/passwd",
            "../../../../../../etc/passwd",
            "a/../../b/../../c.csv",
            "./../x.csv",
        ] {
            let p = m.resolve(Path::new(source)).unwrap();
            assert!(p.starts_with(m.cache_root()), "{source} escaped to {p:?}");
            assert!(!p.components().any(|c| c == Component::ParentDir));
        }
    }

    #[test]
    fn absolute_traversal_stays_inside_root() {
        let m = mapper();
        let p = m
            .resolve(Path::new("/home/user/.cache/datacache/../../../../etc/passwd"))
            .unwrap();
        assert!(p.starts_with(m.cache_root()));
        assert_eq!(p, PathBuf::from("/home/user/.cache/datacache/etc/passwd.dcache"));
    }

    #[test]
    fn illegal_characters_stripped() {
        let p = mapper().resolve(Path::new("we:ird/fi<le>?.csv")).unwrap();
        assert!(p.ends_with("weird/file.csv.dcache"));
    }

    #[test]
    fn dot_lookalikes_removed() {
        let p = mapper().resolve(Path::new(".:./x.csv")).unwrap();
        assert_eq!(p, PathBuf::from("/home/user/.cache/datacache/x.csv.dcache"));
    }

    #[test]
    fn reserved_names_suffixed() {
        let p = mapper().resolve(Path::new("con/aux.csv")).unwrap();
        assert!(p.ends_with("con_/aux_.csv.dcache"));
    }

    #[test]
    fn long_components_truncated() {
        let name = format!("{}.csv", "é".repeat(200));
        let p = mapper().resolve(Path::new(&name)).unwrap();
        for c in p.components() {
            assert!(c.as_os_str().len() <= MAX_COMPONENT_LEN + ".dcache".len());
        }
    }

    #[test]
    fn unusable_paths_error() {
        let m = mapper();
        for source in ["", "..", "/", "???"] {
            assert!(
                matches!(
                    m.resolve(Path::new(source)),
                    Err(CacheError::PathResolution { .. })
                ),
                "{source:?} should not resolve"
            );
        }
    }

    #[test]
    fn dir_as_file_is_entry_parent() {
        let d = mapper()
            .dir_as(Path::new("data/a.csv"), PathKind::File)
            .unwrap();
        assert_eq!(d, PathBuf::from("/home/user/.cache/datacache/data"));
    }

    #[test]
    fn dir_as_directory_mirrors_path() {
        let d = mapper()
            .dir_as(Path::new("data/raw"), PathKind::Directory)
            .unwrap();
        assert_eq!(d, PathBuf::from("/home/user/.cache/datacache/data/raw"));
    }

    #[test]
    fn dir_guesses_nonexistent_paths() {
        let m = mapper();
        let file_like = m.dir(Path::new("nonexistent-dir/report.csv")).unwrap();
        assert_eq!(file_like, PathBuf::from("/home/user/.cache/datacache/nonexistent-dir"));
        let dir_like = m.dir(Path::new("nonexistent-dir/reports")).unwrap();
        assert_eq!(
            dir_like,
            PathBuf::from("/home/user/.cache/datacache/nonexistent-dir/reports")
        );
    }

    #[test]
    fn dir_uses_filesystem_when_path_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let dotted_dir = tmp.path().join("v1.2");
        std::fs::create_dir(&dotted_dir).unwrap();
        let m = PathMapper::new(tmp.path().join("cache"), "dcache");
        assert_eq!(PathKind::infer(&dotted_dir), PathKind::Directory);
        assert_eq!(m.dir(&dotted_dir).unwrap(), tmp.path().join("cache").join("v1.2"));
    }

    #[test]
    fn root_with_parent_segments_is_normalized() {
        let m = PathMapper::new("/srv/project/sub/../.cache", "dcache");
        assert_eq!(m.cache_root(), Path::new("/srv/project/.cache"));
        assert!(m.contains(Path::new("/srv/project/.cache/stray.csv")));
        assert!(m.contains(Path::new("/srv/project/sub/../.cache/stray.csv")));
    }

    #[test]
    fn contains_checks_prefix() {
        let m = mapper();
        assert!(m.contains(Path::new("/home/user/.cache/datacache/a/b.dcache")));
        assert!(!m.contains(Path::new("/home/user/.cache/datacache/../x")));
        assert!(!m.contains(Path::new("/home/user/data.csv")));
        assert!(!m.contains(Path::new("relative.csv")));
    }
}
