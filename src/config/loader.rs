//! Configuration Loader
//!
//! Loads settings from built-in defaults, config files and the environment.
//! Files are merged as JSON trees so a file only needs the keys it overrides.

use crate::config::settings::Settings;
use crate::error::{BotError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Configuration loader with support for multiple sources
pub struct ConfigLoader {
    tree: Value,
}

impl ConfigLoader {
    /// Create a new config loader and load from default locations
    pub fn new() -> Result<Self> {
        let mut loader = Self::with_defaults()?;
        loader.load_from_default_paths()?;
        Ok(loader)
    }

    /// Create a loader with a specific config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut loader = Self::with_defaults()?;
        loader.load_from_file(path)?;
        Ok(loader)
    }

    /// Loader holding only the built-in defaults
    fn with_defaults() -> Result<Self> {
        let defaults = include_str!("../../defaults.json");
        let tree: Value = serde_json::from_str(defaults).map_err(|e| {
            BotError::Config(format!("Failed to parse built-in defaults.json: {}", e))
        })?;
        Ok(Self { tree })
    }

    /// Load configuration from default paths
    fn load_from_default_paths(&mut self) -> Result<()> {
        for path in Self::get_config_paths() {
            if path.exists() {
                self.load_from_file(&path)?;
            }
        }
        Ok(())
    }

    /// Get list of config paths to check
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(custom_path) = std::env::var("KEYRING_BOT_CONFIG") {
            paths.push(PathBuf::from(custom_path));
        }

        paths.push(PathBuf::from("keyring-bot.json"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("keyring-bot").join("config.json"));
        }

        paths
    }

    /// Load configuration from a specific file
    fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BotError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let overlay: Value = serde_json::from_str(&content).map_err(|e| {
            BotError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        tracing::debug!(path = %path.display(), "loaded config file");
        merge_tree(&mut self.tree, overlay);
        Ok(())
    }

    /// Build validated settings, applying environment overrides last
    pub fn into_settings(self) -> Result<Settings> {
        let mut settings: Settings = serde_json::from_value(self.tree)
            .map_err(|e| BotError::Config(format!("Invalid settings: {}", e)))?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }
}

/// Merge `overlay` into `base`; objects merge key by key, everything else replaces
fn merge_tree(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_tree(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_builtin_defaults() {
        let loader = ConfigLoader::with_defaults().unwrap();
        let settings: Settings = serde_json::from_value(loader.tree).unwrap();
        assert_eq!(settings.pool.max_keys, 10);
        assert_eq!(settings.pool.rate_limit_penalty_secs, 600);
        assert_eq!(settings.generation.fallback_replies.len(), 4);
        assert_eq!(settings.chat.persona_name, "Leyana");
    }

    #[test]
    fn test_load_from_custom_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
                "pool": {{ "max_keys": 4 }},
                "provider": {{ "model": "gemini-2.5-pro" }}
            }}"#
        )
        .unwrap();

        let loader = ConfigLoader::from_path(file.path()).unwrap();
        let settings: Settings = serde_json::from_value(loader.tree).unwrap();
        assert_eq!(settings.pool.max_keys, 4);
        // Untouched siblings keep their defaults.
        assert_eq!(settings.pool.failure_threshold, 2);
        assert_eq!(settings.provider.model, "gemini-2.5-pro");
        assert_eq!(settings.provider.probe_model, "gemini-2.5-flash");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();

        let err = ConfigLoader::from_path(file.path()).err().unwrap();
        assert!(matches!(err, BotError::Config(_)));
    }

    #[test]
    fn test_merge_replaces_arrays() {
        let mut base = serde_json::json!({ "a": { "list": [1, 2, 3], "keep": true } });
        merge_tree(&mut base, serde_json::json!({ "a": { "list": [9] } }));
        assert_eq!(base, serde_json::json!({ "a": { "list": [9], "keep": true } }));
    }
}
