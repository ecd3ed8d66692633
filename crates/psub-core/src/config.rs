//! Configuration resolution for psub.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/psub/settings.json)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default number of pooled channel endpoints.
pub const DEFAULT_REDUNDANCY: usize = 5;

/// Complete psub configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Endpoint pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Number of endpoints listening on the shared channel name.
    pub redundancy: usize,
    /// Directory holding the socket file (unix only).
    pub socket_dir: Option<PathBuf>,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            redundancy: DEFAULT_REDUNDANCY,
            socket_dir: None,
        }
    }
}

impl BroadcastConfig {
    /// Redundancy with the zero case mapped to the default.
    pub const fn effective_redundancy(&self) -> usize {
        if self.redundancy == 0 {
            DEFAULT_REDUNDANCY
        } else {
            self.redundancy
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config() -> Result<Config> {
    let mut config = match global_config_path() {
        Some(path) if path.exists() => load_config_file(&path)?,
        _ => Config::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .ok()
            .map(|h| PathBuf::from(h).join("psub").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/psub/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("psub").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Read and parse a single JSON config file.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Apply `PSUB_*` overrides. Unparseable values are ignored.
pub fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(n) = var("PSUB_REDUNDANCY").and_then(|v| v.parse().ok()) {
        config.broadcast.redundancy = n;
    }
    if let Some(dir) = var("PSUB_SOCKET_DIR").filter(|v| !v.is_empty()) {
        config.broadcast.socket_dir = Some(PathBuf::from(dir));
    }
    if let Some(level) = var("PSUB_LOG_LEVEL").filter(|v| !v.is_empty()) {
        config.logging.level = level;
    }
    if let Some(json) = var("PSUB_LOG_JSON").and_then(|v| parse_flag(&v)) {
        config.logging.json = json;
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_has_five_endpoints() {
        let config = Config::default();
        assert_eq!(config.broadcast.redundancy, DEFAULT_REDUNDANCY);
        assert_eq!(config.broadcast.effective_redundancy(), 5);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn zero_redundancy_uses_default() {
        let config = BroadcastConfig {
            redundancy: 0,
            socket_dir: None,
        };
        assert_eq!(config.effective_redundancy(), DEFAULT_REDUNDANCY);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"broadcast":{"redundancy":8}}"#).unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.broadcast.redundancy, 8);
        assert!(config.broadcast.socket_dir.is_none());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(&err, Error::Config(msg) if msg.contains("settings.json")));
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(&err, Error::Config(msg) if msg.contains("absent.json")));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("PSUB_REDUNDANCY", "12"),
                ("PSUB_SOCKET_DIR", "/run/psub"),
                ("PSUB_LOG_LEVEL", "debug"),
                ("PSUB_LOG_JSON", "true"),
            ]),
        );
        assert_eq!(config.broadcast.redundancy, 12);
        assert_eq!(config.broadcast.socket_dir, Some(PathBuf::from("/run/psub")));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn unparseable_env_values_are_ignored() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            env(&[("PSUB_REDUNDANCY", "many"), ("PSUB_LOG_JSON", "maybe")]),
        );
        assert_eq!(config, Config::default());
    }
}
