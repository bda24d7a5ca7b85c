//! Shared, synchronized settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::warn;

use crate::error::ConfigError;
use crate::settings::CacheSettings;

static GLOBAL: Lazy<SettingsStore> =
    Lazy::new(|| SettingsStore::new(settings_or_fallback(CacheSettings::from_env())));

/// Unwraps resolved settings, falling back to the temporary directory with
/// a warning when the configured root cannot be resolved.
fn settings_or_fallback(resolved: Result<CacheSettings, ConfigError>) -> CacheSettings {
    resolved.unwrap_or_else(|e| {
        let fallback = CacheSettings::fallback();
        warn!(
            error = %e,
            fallback = %fallback.cache_root().display(),
            "could not resolve cache root; using fallback"
        );
        fallback
    })
}

/// Settings guarded by a read/write lock.
///
/// Engines take a [`snapshot`](Self::snapshot) when they are constructed, so
/// changes made through the setters apply to engines built afterwards.
#[derive(Debug)]
pub struct SettingsStore {
    inner: RwLock<CacheSettings>,
}

impl SettingsStore {
    /// Creates a store holding the given settings.
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    /// The process-wide store, initialised from `CACHE_ROOT` on first use.
    pub fn global() -> &'static SettingsStore {
        &GLOBAL
    }

    /// A copy of the current settings.
    pub fn snapshot(&self) -> CacheSettings {
        self.inner.read().clone()
    }

    /// The current cache root.
    pub fn cache_root(&self) -> PathBuf {
        self.inner.read().cache_root().to_path_buf()
    }

    /// Sets the cache root, resolving it to an absolute path.
    pub fn set_cache_root(&self, cache_root: impl AsRef<Path>) -> Result<(), ConfigError> {
        self.inner.write().set_cache_root(cache_root)
    }

    /// The current age tolerance.
    pub fn age_tolerance(&self) -> Duration {
        self.inner.read().age_tolerance()
    }

    /// Sets the age tolerance.
    pub fn set_age_tolerance(&self, age_tolerance: Duration) {
        self.inner.write().set_age_tolerance(age_tolerance);
    }

    /// Replaces all settings at once.
    pub fn replace(&self, settings: CacheSettings) {
        *self.inner.write() = settings;
    }
}
