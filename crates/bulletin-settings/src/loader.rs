//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::BulletinSettings;

/// Resolve the default settings file (`~/.bulletin/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".bulletin").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid combination of
/// values is an error.
pub fn load_settings_from_path(path: &Path) -> Result<BulletinSettings> {
    let parse_error = |source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let defaults = serde_json::to_value(BulletinSettings::default()).map_err(parse_error)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(parse_error)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: BulletinSettings = serde_json::from_value(merged).map_err(parse_error)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
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

/// Apply `BULLETIN_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut BulletinSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup.
///
/// Values that fail to parse or fall outside their range are ignored with a
/// warning, keeping the file/default value.
pub fn apply_overrides(settings: &mut BulletinSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("BULLETIN_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_parsed(&read, "BULLETIN_PORT", |v| parse_range::<u16>(v, 0, u16::MAX)) {
        settings.server.port = v;
    }
    if let Some(v) = read_parsed(&read, "BULLETIN_MAX_CONNECTIONS", |v| {
        parse_range::<usize>(v, 1, 1_000_000)
    }) {
        settings.server.max_connections = v;
    }
    if let Some(v) = read_parsed(&read, "BULLETIN_QUEUE_CAPACITY", |v| {
        parse_range::<usize>(v, 1, 1_000_000)
    }) {
        settings.server.queue_capacity = v;
    }
    if let Some(v) = read_parsed(&read, "BULLETIN_HEARTBEAT_INTERVAL_SECS", |v| {
        parse_range::<u64>(v, 1, 3_600)
    }) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = read_parsed(&read, "BULLETIN_HEARTBEAT_TIMEOUT_SECS", |v| {
        parse_range::<u64>(v, 1, 86_400)
    }) {
        settings.server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = read_parsed(&read, "BULLETIN_DRAIN_GRACE_MS", |v| {
        parse_range::<u64>(v, 0, 600_000)
    }) {
        settings.server.drain_grace_ms = v;
    }
    if let Some(v) = read("BULLETIN_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_parsed(&read, "BULLETIN_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

fn read_parsed<T>(
    read: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = read(name)?;
    let result = parse(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
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

/// Parse a number within an inclusive range.
pub fn parse_range<T: std::str::FromStr + PartialOrd>(val: &str, min: T, max: T) -> Option<T> {
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_simple_override() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"b": 3});
        assert_eq!(deep_merge(target, source), serde_json::json!({"a": 1, "b": 3}));
    }

    #[test]
    fn merge_nested_objects() {
        let target = serde_json::json!({"server": {"port": 1, "host": "h"}});
        let source = serde_json::json!({"server": {"port": 2}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 2);
        assert_eq!(merged["server"]["host"], "h");
    }

    #[test]
    fn merge_skips_null() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.server.queue_capacity, 256);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(br#"{"server":{"queueCapacity":8,"maxConnections":3},"logging":{"json":true}}"#)
            .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.server.queue_capacity, 8);
        assert_eq!(settings.server.max_connections, 3);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Parse { path: p, .. }) if p == path
        );
    }

    #[test]
    fn wrong_value_type_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"port":"five thousand"}}"#).unwrap();
        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Parse { .. }));
    }

    #[test]
    fn invalid_values_are_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"queueCapacity":0}}"#).unwrap();
        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Invalid { field: "server.queueCapacity", .. })
        );
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut s = BulletinSettings::default();
        apply_overrides(
            &mut s,
            env(&[
                ("BULLETIN_HOST", "0.0.0.0"),
                ("BULLETIN_PORT", "5000"),
                ("BULLETIN_QUEUE_CAPACITY", "16"),
                ("BULLETIN_MAX_CONNECTIONS", "10"),
                ("BULLETIN_DRAIN_GRACE_MS", "0"),
                ("BULLETIN_LOG_LEVEL", "debug"),
                ("BULLETIN_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.server.port, 5000);
        assert_eq!(s.server.queue_capacity, 16);
        assert_eq!(s.server.max_connections, 10);
        assert_eq!(s.server.drain_grace_ms, 0);
        assert_eq!(s.logging.level, "debug");
        assert!(s.logging.json);
    }

    #[test]
    fn invalid_env_values_ignored() {
        let mut s = BulletinSettings::default();
        apply_overrides(
            &mut s,
            env(&[
                ("BULLETIN_PORT", "99999"),
                ("BULLETIN_QUEUE_CAPACITY", "0"),
                ("BULLETIN_LOG_JSON", "maybe"),
                ("BULLETIN_HOST", ""),
            ]),
        );
        assert_eq!(s, BulletinSettings::default());
    }

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("nah"), None);
    }

    #[test]
    fn parse_range_bounds() {
        assert_eq!(parse_range::<u64>("5", 1, 10), Some(5));
        assert_eq!(parse_range::<u64>("0", 1, 10), None);
        assert_eq!(parse_range::<u64>("11", 1, 10), None);
        assert_eq!(parse_range::<u64>("x", 1, 10), None);
    }
}
