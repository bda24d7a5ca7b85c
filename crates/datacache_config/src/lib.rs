//! Cache settings: root directory and age tolerance.
//!
//! Settings come from built-in defaults, an optional `datacache.toml` file,
//! and the `CACHE_ROOT` environment variable, in increasing precedence.
//! Engines receive a [`CacheSettings`] value at construction; the
//! process-wide [`SettingsStore::global`] instance exists for callers that
//! want a single shared configuration.

#![warn(missing_docs)]

pub mod duration;
pub mod error;
pub mod loader;
pub mod settings;
pub mod store;
pub mod types;

pub use duration::{parse_duration, tolerance};
pub use error::ConfigError;
pub use loader::{load_settings, load_settings_from_str, resolve_settings};
pub use settings::{
    default_cache_root, CacheSettings, CACHE_ROOT_ENV, DEFAULT_AGE_TOLERANCE, SETTINGS_FILE,
};
pub use store::SettingsStore;
pub use types::{CacheSection, SettingsFile};
