//! Settings file types deserialized from `datacache.toml`.

use serde::Deserialize;

/// The top-level settings file.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsFile {
    /// Cache root and staleness settings.
    #[serde(default)]
    pub cache: CacheSection,
}

/// The `[cache]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    /// Cache root directory. Relative paths resolve against the current
    /// working directory.
    #[serde(default)]
    pub root: Option<String>,
    /// Maximum age of a cache entry whose source file no longer exists,
    /// e.g. `"7d"`.
    #[serde(default)]
    pub age_tolerance: Option<String>,
}
