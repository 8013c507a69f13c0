//! Configuration loading and management
//!
//! Handles parsing of `.liveboard.toml` configuration files.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Mutation engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Presence hub configuration
    #[serde(default)]
    pub hub: HubConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            hub: HubConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load configuration from a file, falling back to defaults when the
    /// file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

/// Mutation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How many times a `Transient` storage failure is retried before it
    /// is surfaced to the caller
    #[serde(default = "default_max_transient_retries")]
    pub max_transient_retries: u32,
}

fn default_max_transient_retries() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_transient_retries: default_max_transient_retries(),
        }
    }
}

/// Presence hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Maximum number of simultaneously registered connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    10_000
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.max_transient_retries, 3);
        assert_eq!(config.hub.max_connections, 10_000);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [engine]
            max_transient_retries = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.max_transient_retries, 7);
        assert_eq!(config.hub.max_connections, 10_000);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.engine.max_transient_retries, 3);
    }
}
