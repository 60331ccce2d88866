//! # bulletin-settings
//!
//! Configuration with layered sources. In priority order:
//! 1. **Compiled defaults**: [`BulletinSettings::default()`]
//! 2. **Settings file**: `~/.bulletin/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `BULLETIN_*` overrides (highest priority)
//!
//! Settings are loaded once by the binary and passed down explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings_from_path, settings_path};
pub use types::{BulletinSettings, LoggingSettings, ServerSettings};
