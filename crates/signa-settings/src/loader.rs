//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::SignaSettings;

/// Resolve the default settings file (`~/.signa/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".signa").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SignaSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SignaSettings> {
    let settings = load_unvalidated(path)?;
    settings.validate()?;
    Ok(settings)
}

/// Like [`load_settings_from_path`] but without validation, for callers that
/// layer further overrides on top and validate the final result themselves.
pub fn load_unvalidated(path: &Path) -> Result<SignaSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<SignaSettings> {
    let defaults = serde_json::to_value(SignaSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut SignaSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are ignored with a warning and the file/default value is kept.
pub fn apply_overrides<F>(settings: &mut SignaSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("PORT") {
        match parse_u16_range(&v, 1, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "PORT", value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = read("SIGNA_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("SIGNA_MAX_SEND_QUEUE") {
        match parse_usize_range(&v, 1, 65_536) {
            Some(n) => settings.server.max_send_queue = n,
            None => warn!(key = "SIGNA_MAX_SEND_QUEUE", value = %v, "invalid usize env var, ignoring"),
        }
    }
    if let Some(v) = read("SIGNA_QUEUE_CAPACITY") {
        match parse_usize_range(&v, 1, 1_000_000) {
            Some(n) => settings.pipeline.queue_capacity = n,
            None => warn!(key = "SIGNA_QUEUE_CAPACITY", value = %v, "invalid usize env var, ignoring"),
        }
    }
    if let Some(v) = read("SIGNA_OVERFLOW_POLICY") {
        match v.parse() {
            Ok(policy) => settings.pipeline.overflow_policy = policy,
            Err(e) => warn!(key = "SIGNA_OVERFLOW_POLICY", value = %v, error = %e, "ignoring"),
        }
    }
    if let Some(v) = read("SIGNA_PURGE_ON_DEACTIVATE") {
        match parse_bool(&v) {
            Some(b) => settings.pipeline.purge_on_deactivate = b,
            None => warn!(key = "SIGNA_PURGE_ON_DEACTIVATE", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = read("SIGNA_STUB_LATENCY_MS") {
        match parse_u64_range(&v, 0, 60_000) {
            Some(ms) => settings.pipeline.stub_latency_ms = ms,
            None => warn!(key = "SIGNA_STUB_LATENCY_MS", value = %v, "invalid u64 env var, ignoring"),
        }
    }
    if let Some(v) = read("SIGNA_LOG_LEVEL") {
        if signa_telemetry::parse_level(&v).is_some() {
            settings.logging.level = v.to_lowercase();
        } else {
            warn!(key = "SIGNA_LOG_LEVEL", value = %v, "invalid log level env var, ignoring");
        }
    }
    if let Some(v) = read("SIGNA_LOG_FORMAT") {
        match v.parse() {
            Ok(format) => settings.logging.format = format,
            Err(e) => warn!(key = "SIGNA_LOG_FORMAT", value = %v, error = %e, "ignoring"),
        }
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
