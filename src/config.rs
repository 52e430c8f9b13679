//! Engine configuration — deserialization, validation, and defaulting.
//!
//! Configuration lives as JSON on disk (never TOML — front-ends are expected
//! to be web or Electron-adjacent tooling that already speaks JSON). Fields
//! this crate doesn't know about are round-tripped rather than dropped, so a
//! front-end can stash its own settings alongside the engine's.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ClimbError, Result};

fn default_version() -> String {
    "1".to_string()
}

fn default_default_args() -> Vec<String> {
    Vec::new()
}

fn default_structure_ttl_ms() -> u64 {
    300_000
}

fn default_output_ttl_ms() -> u64 {
    30_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_introspection_timeout_ms() -> u64 {
    3_000
}

fn default_execute_timeout_ms() -> u64 {
    30_000
}

fn default_max_history_size() -> u32 {
    50
}

/// Cache freshness windows, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default = "default_structure_ttl_ms")]
    pub structure: u64,
    #[serde(default = "default_output_ttl_ms")]
    pub output: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            structure: default_structure_ttl_ms(),
            output: default_output_ttl_ms(),
        }
    }
}

/// Cosmetic display preferences. Never affects parsing or execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeConfig {
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_true")]
    pub enable_colors: bool,
}

fn default_color() -> String {
    "cyan".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            color: default_color(),
            enable_colors: true,
        }
    }
}

/// Timeout budgets, in milliseconds, for the three operation classes the
/// engine performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    #[serde(default = "default_timeout_ms")]
    pub default: u64,
    #[serde(default = "default_introspection_timeout_ms")]
    pub introspection: u64,
    #[serde(default = "default_execute_timeout_ms")]
    pub execute: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default: default_timeout_ms(),
            introspection: default_introspection_timeout_ms(),
            execute: default_execute_timeout_ms(),
        }
    }
}

/// Run-history bookkeeping preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfig {
    #[serde(default)]
    pub capture_history: bool,
    #[serde(default = "default_max_history_size")]
    pub max_history_size: u32,
    #[serde(default)]
    pub show_confidence: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            capture_history: false,
            max_history_size: default_max_history_size(),
            show_confidence: false,
        }
    }
}

/// Top-level engine configuration, read from and written back to a JSON file.
///
/// `extra` captures any fields this version of the engine doesn't recognize,
/// so round-tripping a config written by a newer front-end never silently
/// discards its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default = "default_version")]
    pub version: String,
    pub target_cli: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_path: Option<String>,
    #[serde(default = "default_default_args")]
    pub default_args: Vec<String>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Configuration {
    /// Build a minimal configuration for `target_cli`, all other fields defaulted.
    pub fn for_cli(target_cli: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            target_cli: target_cli.into(),
            cli_path: None,
            default_args: Vec::new(),
            cache: CacheConfig::default(),
            theme: ThemeConfig::default(),
            timeouts: TimeoutConfig::default(),
            execution: ExecutionConfig::default(),
            extra: HashMap::new(),
        }
    }

    /// Parse and validate a configuration from a JSON string.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Configuration =
            serde_json::from_str(text).map_err(|e| ClimbError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from disk, falling back to a bare default for
    /// `target_cli` if the file is missing, unreadable, or fails to parse —
    /// configuration is advisory, never load-bearing.
    pub fn load_or_default(path: &std::path::Path, fallback_target_cli: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match Self::from_json(&text) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "config invalid, falling back to defaults");
                    Self::for_cli(fallback_target_cli)
                }
            },
            Err(_) => Self::for_cli(fallback_target_cli),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ClimbError::ConfigInvalid(e.to_string()))
    }

    /// Validate field-level invariants not already expressed in the type.
    pub fn validate(&self) -> Result<()> {
        if self.target_cli.trim().is_empty() {
            return Err(ClimbError::ConfigInvalid(
                "targetCLI must be a non-empty executable name".to_string(),
            ));
        }
        if self.target_cli.contains('/') || self.target_cli.contains('\\') {
            return Err(ClimbError::ConfigInvalid(format!(
                "targetCLI must be a bare executable name, not a path: '{}'",
                self.target_cli
            )));
        }

        if self.cache.structure == 0 {
            return Err(ClimbError::ConfigInvalid(
                "cache.structure must be greater than zero".to_string(),
            ));
        }
        if self.cache.output == 0 {
            return Err(ClimbError::ConfigInvalid(
                "cache.output must be greater than zero".to_string(),
            ));
        }

        if self.timeouts.default == 0 || self.timeouts.introspection == 0 || self.timeouts.execute == 0 {
            return Err(ClimbError::ConfigInvalid(
                "all timeout values must be greater than zero".to_string(),
            ));
        }
        if self.timeouts.introspection > self.timeouts.execute {
            return Err(ClimbError::ConfigInvalid(
                "timeouts.introspection should not exceed timeouts.execute".to_string(),
            ));
        }

        if self.execution.capture_history && self.execution.max_history_size == 0 {
            return Err(ClimbError::ConfigInvalid(
                "execution.maxHistorySize must be greater than zero when captureHistory is enabled"
                    .to_string(),
            ));
        }

        if let Some(cli_path) = &self.cli_path {
            if cli_path.trim().is_empty() {
                return Err(ClimbError::ConfigInvalid(
                    "cliPath, if set, must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Configuration::from_json(r#"{"targetCLI": "git"}"#).unwrap();
        assert_eq!(config.version, "1");
        assert_eq!(config.cache.structure, 300_000);
        assert_eq!(config.timeouts.execute, 30_000);
        assert!(config.theme.enable_colors);
    }

    #[test]
    fn test_empty_target_cli_rejected() {
        let result = Configuration::from_json(r#"{"targetCLI": ""}"#);
        assert!(matches!(result, Err(ClimbError::ConfigInvalid(_))));
    }

    #[test]
    fn test_target_cli_with_path_separator_rejected() {
        let result = Configuration::from_json(r#"{"targetCLI": "/usr/bin/git"}"#);
        assert!(matches!(result, Err(ClimbError::ConfigInvalid(msg)) if msg.contains("bare executable")));
    }

    #[test]
    fn test_zero_cache_ttl_rejected() {
        let result = Configuration::from_json(r#"{"targetCLI": "git", "cache": {"structure": 0}}"#);
        assert!(matches!(result, Err(ClimbError::ConfigInvalid(_))));
    }

    #[test]
    fn test_introspection_timeout_exceeding_execute_rejected() {
        let result = Configuration::from_json(
            r#"{"targetCLI": "git", "timeouts": {"introspection": 60000, "execute": 1000}}"#,
        );
        assert!(matches!(result, Err(ClimbError::ConfigInvalid(_))));
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let config =
            Configuration::from_json(r#"{"targetCLI": "git", "frontendNotes": "keep me"}"#).unwrap();
        assert_eq!(
            config.extra.get("frontendNotes").and_then(|v| v.as_str()),
            Some("keep me")
        );
        let json = config.to_json_pretty().unwrap();
        assert!(json.contains("frontendNotes"));
    }

    #[test]
    fn test_load_or_default_falls_back_on_missing_file() {
        let config = Configuration::load_or_default(std::path::Path::new("/nonexistent/path.json"), "kubectl");
        assert_eq!(config.target_cli, "kubectl");
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn test_load_or_default_falls_back_on_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not valid json").unwrap();
        let config = Configuration::load_or_default(&path, "kubectl");
        assert_eq!(config.target_cli, "kubectl");
    }

    #[test]
    fn test_capture_history_requires_nonzero_max() {
        let result = Configuration::from_json(
            r#"{"targetCLI": "git", "execution": {"captureHistory": true, "maxHistorySize": 0}}"#,
        );
        assert!(matches!(result, Err(ClimbError::ConfigInvalid(_))));
    }

    #[test]
    fn test_for_cli_builds_valid_default_config() {
        let config = Configuration::for_cli("aws");
        assert!(config.validate().is_ok());
    }
}
