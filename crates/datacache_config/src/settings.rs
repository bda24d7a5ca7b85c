//! The cache settings value threaded through every engine.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use datacache_common::normalize_lexically;

use crate::error::ConfigError;

/// Environment variable that overrides the cache root.
pub const CACHE_ROOT_ENV: &str = "CACHE_ROOT";

/// Settings file name looked up in a configuration directory.
pub const SETTINGS_FILE: &str = "datacache.toml";

/// Default age tolerance for cache entries whose source no longer exists.
pub const DEFAULT_AGE_TOLERANCE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Directory name appended to the per-user cache directory.
const CACHE_DIR_NAME: &str = "datacache";

/// Cache root directory and staleness tolerance.
///
/// The cache root is always absolute and free of `.`/`..` segments;
/// relative inputs are resolved against the current working directory when
/// the settings are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    cache_root: PathBuf,
    age_tolerance: Duration,
}

impl CacheSettings {
    /// Creates settings rooted at `cache_root` with the default age tolerance.
    pub fn new(cache_root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self {
            cache_root: absolute_root(cache_root.as_ref())?,
            age_tolerance: DEFAULT_AGE_TOLERANCE,
        })
    }

    /// Builds settings from the `CACHE_ROOT` environment variable, falling
    /// back to the per-user cache directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::with_env_root(std::env::var_os(CACHE_ROOT_ENV))
    }

    /// Builds settings from an optional `CACHE_ROOT` value.
    pub(crate) fn with_env_root(env_root: Option<OsString>) -> Result<Self, ConfigError> {
        match env_root.filter(|v| !v.is_empty()) {
            Some(root) => Self::new(PathBuf::from(root)),
            None => Self::new(default_cache_root()),
        }
    }

    /// Settings under the system temporary directory, used when the
    /// configured root cannot be resolved.
    pub(crate) fn fallback() -> Self {
        Self {
            cache_root: std::env::temp_dir().join(CACHE_DIR_NAME),
            age_tolerance: DEFAULT_AGE_TOLERANCE,
        }
    }

    /// Returns a copy with the given age tolerance.
    pub fn with_age_tolerance(mut self, age_tolerance: Duration) -> Self {
        self.age_tolerance = age_tolerance;
        self
    }

    /// The absolute cache root directory.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// How long a cache entry without a source file stays trusted.
    pub fn age_tolerance(&self) -> Duration {
        self.age_tolerance
    }

    /// Replaces the cache root, resolving it to an absolute path.
    pub fn set_cache_root(&mut self, cache_root: impl AsRef<Path>) -> Result<(), ConfigError> {
        self.cache_root = absolute_root(cache_root.as_ref())?;
        Ok(())
    }

    /// Replaces the age tolerance.
    pub fn set_age_tolerance(&mut self, age_tolerance: Duration) {
        self.age_tolerance = age_tolerance;
    }
}

/// The per-user default cache root, without consulting `CACHE_ROOT`.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join(CACHE_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".").join(format!(".{CACHE_DIR_NAME}")))
}

fn absolute_root(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "cache root must not be empty".to_string(),
        ));
    }
    Ok(normalize_lexically(&std::path::absolute(path)?))
}
