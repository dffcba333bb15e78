//! Client configuration.
//!
//! Stored in TOML at `~/.config/gaq/config.toml` (or the XDG equivalent).
//! Every field is optional; a missing file yields the defaults.
//!
//! # Example Configuration
//!
//! ```toml
//! page_size = 1000
//! throttle_interval_ms = 1000
//! template_min_index = 1
//! template_max_index = 20
//! default_endpoint = "core"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::Endpoint;

/// Largest page the reporting API will hand out in one response.
pub const MAX_PAGE_SIZE: u32 = 10_000;

/// Errors that can occur when loading or saving the client configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Rows per request when neither `step` nor `limit` says otherwise.
    pub page_size: u32,
    /// Minimum spacing between two transport calls of one query lineage.
    pub throttle_interval_ms: u64,
    /// Index range used when expanding templated columns (`customVarXX`).
    pub template_min_index: u32,
    pub template_max_index: u32,
    /// Endpoint used by `describe` when a description has no `type`.
    pub default_endpoint: Endpoint,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            throttle_interval_ms: 1000,
            template_min_index: 1,
            template_max_index: 20,
            default_endpoint: Endpoint::Core,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the default location, then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path. No env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get the default configuration file path.
    ///
    /// - Primary: `$XDG_CONFIG_HOME/gaq/config.toml`
    /// - Fallback: platform config dir (e.g. `~/.config/gaq/config.toml` on Linux)
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config).join("gaq").join("config.toml"));
        }

        dirs::config_dir()
            .map(|p| p.join("gaq").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Override fields from `GAQ_PAGE_SIZE` and `GAQ_THROTTLE_MS` when set.
    pub fn apply_env(&mut self) {
        if let Ok(val) = dotenvy::var("GAQ_PAGE_SIZE")
            && let Ok(parsed) = val.parse::<u32>()
        {
            self.page_size = parsed.clamp(1, MAX_PAGE_SIZE);
        }
        if let Ok(val) = dotenvy::var("GAQ_THROTTLE_MS")
            && let Ok(parsed) = val.parse::<u64>()
        {
            self.throttle_interval_ms = parsed;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.template_min_index > self.template_max_index {
            return Err(ConfigError::Validation(format!(
                "template_min_index ({}) is larger than template_max_index ({})",
                self.template_min_index, self.template_max_index
            )));
        }
        Ok(())
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.throttle_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ClientConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "page_size = 250\ndefault_endpoint = \"realtime\"\n").unwrap();

        let config = ClientConfig::load_from(&path).unwrap();
        assert_eq!(config.page_size, 250);
        assert_eq!(config.default_endpoint, Endpoint::Realtime);
        assert_eq!(config.throttle_interval_ms, 1000);
    }

    #[test]
    fn test_invalid_page_size_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "page_size = 0\n").unwrap();
        assert!(matches!(
            ClientConfig::load_from(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_inverted_template_range_rejected() {
        let config = ClientConfig {
            template_min_index: 5,
            template_max_index: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = ClientConfig {
            page_size: 42,
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(ClientConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        unsafe {
            std::env::set_var("GAQ_PAGE_SIZE", "99999");
            std::env::set_var("GAQ_THROTTLE_MS", "0");
        }
        let mut config = ClientConfig::default();
        config.apply_env();
        unsafe {
            std::env::remove_var("GAQ_PAGE_SIZE");
            std::env::remove_var("GAQ_THROTTLE_MS");
        }
        assert_eq!(config.page_size, MAX_PAGE_SIZE);
        assert_eq!(config.throttle_interval_ms, 0);
    }

    #[test]
    #[serial]
    fn test_config_path_respects_xdg() {
        let dir = TempDir::new().unwrap();
        let prev = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", dir.path()) };
        let path = ClientConfig::config_path().unwrap();
        match prev {
            Some(v) => unsafe { std::env::set_var("XDG_CONFIG_HOME", v) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
        assert_eq!(path, dir.path().join("gaq").join("config.toml"));
    }
}
