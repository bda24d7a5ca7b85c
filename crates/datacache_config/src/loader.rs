//! Settings file loading and environment overrides.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::duration::parse_duration;
use crate::error::ConfigError;
use crate::settings::{CacheSettings, CACHE_ROOT_ENV, SETTINGS_FILE};
use crate::types::SettingsFile;

/// Loads settings for a configuration directory.
///
/// Reads `<config_dir>/datacache.toml` if present, then applies the
/// `CACHE_ROOT` environment variable on top.
pub fn load_settings(config_dir: &Path) -> Result<CacheSettings, ConfigError> {
    let path = config_dir.join(SETTINGS_FILE);
    let file = if path.is_file() {
        let content = std::fs::read_to_string(&path)?;
        Some(parse_settings_file(&content)?)
    } else {
        None
    };
    resolve_settings(file, std::env::var_os(CACHE_ROOT_ENV))
}

/// Parses and validates a `datacache.toml` document into settings.
///
/// Does not consult the environment; useful for testing.
pub fn load_settings_from_str(content: &str) -> Result<CacheSettings, ConfigError> {
    resolve_settings(Some(parse_settings_file(content)?), None)
}

/// Merges defaults, an optional settings file, and an optional `CACHE_ROOT`
/// value. The environment value takes precedence over the file.
pub fn resolve_settings(
    file: Option<SettingsFile>,
    env_root: Option<OsString>,
) -> Result<CacheSettings, ConfigError> {
    let file = file.unwrap_or_default();
    let env_root = env_root.filter(|v| !v.is_empty());

    let mut settings = match (env_root, &file.cache.root) {
        (Some(root), _) => CacheSettings::new(PathBuf::from(root))?,
        (None, Some(root)) => CacheSettings::new(root)?,
        (None, None) => CacheSettings::with_env_root(None)?,
    };

    if let Some(tolerance) = &file.cache.age_tolerance {
        settings.set_age_tolerance(parse_duration(tolerance)?);
    }

    Ok(settings)
}

fn parse_settings_file(content: &str) -> Result<SettingsFile, ConfigError> {
    let file: SettingsFile =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate(&file)?;
    Ok(file)
}

fn validate(file: &SettingsFile) -> Result<(), ConfigError> {
    if file.cache.root.as_deref().is_some_and(|r| r.trim().is_empty()) {
        return Err(ConfigError::ValidationError(
            "cache.root must not be empty".to_string(),
        ));
    }
    Ok(())
}
