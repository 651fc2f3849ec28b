//! # signa-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SignaSettings::default()`]
//! 2. **User file**: `~/.signa/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables**: `PORT` and `SIGNA_*` overrides (highest priority)

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    load_unvalidated, settings_path,
};
pub use types::{LoggingSettings, PipelineSettings, ServerSettings, SignaSettings};
