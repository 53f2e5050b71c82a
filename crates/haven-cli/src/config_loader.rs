//! Configuration file discovery and loading.
//!
//! The discovery order is:
//! 1. `--config <path>` on the command line.
//! 2. `HAVEN_CONFIG` environment variable.
//! 3. `~/.haven/config.json`
//! 4. If none found, defaults.
//!
//! JSON keys are normalized from camelCase to snake_case before the value
//! is deserialized into [`Config`], and the result is validated.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;

use haven_types::config::Config;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "HAVEN_CONFIG";

/// Discover the config file path.
///
/// An explicit env path is returned as-is so a typo surfaces as an error
/// instead of silently falling back to defaults.
pub fn discover_config_path(env_path: Option<String>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(env_path) = env_path.filter(|p| !p.trim().is_empty()) {
        return Some(PathBuf::from(env_path));
    }

    let candidate = home_dir?.join(".haven").join("config.json");
    candidate.exists().then_some(candidate)
}

/// Load, normalize and validate configuration.
pub fn load_config(config_override: Option<&str>) -> anyhow::Result<Config> {
    let path = match config_override {
        Some(p) => Some(PathBuf::from(p)),
        None => discover_config_path(std::env::var(CONFIG_ENV).ok(), dirs::home_dir()),
    };

    let Some(path) = path else {
        tracing::info!("no config file found, using defaults");
        return Ok(Config::default());
    };
    load_config_file(&path)
}

/// Load one config file.
pub fn load_config_file(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        anyhow::bail!("config file not found: {}", path.display());
    }

    tracing::debug!(path = %path.display(), "loading config file");
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;

    let config: Config = serde_json::from_value(normalize_keys(value))
        .with_context(|| format!("invalid config file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Convert camelCase JSON keys to snake_case recursively.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| (camel_to_snake(&key), normalize_keys(val)))
                .collect(),
        ),
        Value::Array(arr) => Value::Array(arr.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

/// Convert a single camelCase string to snake_case.
///
/// A run of uppercase letters (an acronym) stays together; an underscore
/// goes before its last letter only when a lowercase letter follows.
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut result = String::with_capacity(name.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            if prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next.is_some_and(|c| c.is_lowercase()))
            {
                result.push('_');
            }
        }
        result.extend(ch.to_lowercase());
    }
    result
}
