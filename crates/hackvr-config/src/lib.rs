//! Configuration for HackVR endpoints.
//!
//! Optional TOML file with sensible defaults matching the protocol's soft
//! limits; everything works with zero config. The path comes from
//! `$HACKVR_CONFIG` or `~/.config/hackvr/config.toml`.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hackvr_scene::SceneLimits;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct HackVrConfig {
    pub limits: LimitsConfig,
    pub timing: TimingConfig,
    pub net: NetConfig,
}

impl HackVrConfig {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if no config file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        log::info!("Loading config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: HackVrConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the config file path based on environment and platform.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("HACKVR_CONFIG") {
            return PathBuf::from(path);
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".config/hackvr/config.toml")
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_triangles_per_geometry == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_triangles_per_geometry must be positive".into(),
            ));
        }
        if self.limits.max_objects < 2 {
            return Err(ConfigError::ValidationError(format!(
                "limits.max_objects must fit the predefined objects, got {}",
                self.limits.max_objects
            )));
        }
        if self.limits.max_nesting == 0 || self.limits.max_nesting > 64 {
            return Err(ConfigError::ValidationError(format!(
                "limits.max_nesting must be between 1 and 64, got {}",
                self.limits.max_nesting
            )));
        }
        if self.limits.selector_expansion_cap == 0 {
            return Err(ConfigError::ValidationError(
                "limits.selector_expansion_cap must be positive".into(),
            ));
        }
        if self.timing.hello_timeout_ms == 0 || self.timing.hello_timeout_ms > 60_000 {
            return Err(ConfigError::ValidationError(format!(
                "timing.hello_timeout_ms must be between 1 and 60000, got {}",
                self.timing.hello_timeout_ms
            )));
        }
        if self.timing.commands_per_second == 0 {
            return Err(ConfigError::ValidationError(
                "timing.commands_per_second must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The scene-engine view of the configured limits.
    pub fn scene_limits(&self) -> SceneLimits {
        SceneLimits {
            max_triangles_per_geometry: self.limits.max_triangles_per_geometry,
            max_objects: self.limits.max_objects,
            max_nesting: self.limits.max_nesting,
            selector_expansion_cap: self.limits.selector_expansion_cap,
        }
    }
}

/// Soft protocol limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct LimitsConfig {
    /// Triangles one geometry may hold.
    pub max_triangles_per_geometry: usize,
    /// Objects one connection may hold.
    pub max_objects: usize,
    /// Scene-graph nesting depth.
    pub max_nesting: usize,
    /// Concrete applications a create-family selector may expand to.
    pub selector_expansion_cap: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_triangles_per_geometry: 100_000,
            max_objects: 10_000,
            max_nesting: 16,
            selector_expansion_cap: 1_000,
        }
    }
}

/// Timeouts and rates.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct TimingConfig {
    /// Window for the peer's establishment lines, in milliseconds.
    pub hello_timeout_ms: u64,
    /// Command-rate ceiling per connection.
    pub commands_per_second: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            hello_timeout_ms: 500,
            commands_per_second: 1_000,
        }
    }
}

/// Network listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct NetConfig {
    /// Port for `hackvr://`.
    pub port: u16,
    /// Port for `hackvrs://`.
    pub tls_port: u16,
    /// Concurrent connections per listener.
    pub max_connections: usize,
    /// Additional environment tags recorded per deployment.
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            port: 1913,
            tls_port: 19133,
            max_connections: 64,
            tags: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HackVrConfig::default();
        assert_eq!(config.limits.max_triangles_per_geometry, 100_000);
        assert_eq!(config.limits.max_objects, 10_000);
        assert_eq!(config.limits.max_nesting, 16);
        assert_eq!(config.timing.hello_timeout_ms, 500);
        assert_eq!(config.net.port, 1913);
        assert_eq!(config.net.tls_port, 19133);
    }

    #[test]
    fn test_config_validation() {
        let mut config = HackVrConfig::default();

        config.limits.max_nesting = 0;
        assert!(config.validate().is_err());

        config.limits.max_nesting = 16;
        assert!(config.validate().is_ok());

        config.timing.hello_timeout_ms = 0;
        assert!(config.validate().is_err());

        config.timing.hello_timeout_ms = 500;
        assert!(config.validate().is_ok());

        config.limits.max_objects = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_string() {
        let toml = r#"
[limits]
max_objects = 500
selector_expansion_cap = 100

[timing]
hello_timeout_ms = 1000

[net]
port = 4000
"#;

        let config: HackVrConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.limits.max_objects, 500);
        assert_eq!(config.limits.selector_expansion_cap, 100);
        assert_eq!(config.timing.hello_timeout_ms, 1000);
        assert_eq!(config.net.port, 4000);
        // Untouched sections keep their defaults.
        assert_eq!(config.limits.max_triangles_per_geometry, 100_000);
    }

    #[test]
    fn test_deny_unknown_fields() {
        let toml = r#"
[limits]
max_objects = 500
unknown_field = "oops"
"#;

        let result: Result<HackVrConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let path = PathBuf::from("/nonexistent/config.toml");
        let config = HackVrConfig::load_from(&path).unwrap();
        assert_eq!(config.limits.max_objects, 10_000);
    }

    #[test]
    fn test_scene_limits_projection() {
        let config = HackVrConfig::default();
        let limits = config.scene_limits();
        assert_eq!(limits.max_triangles_per_geometry, 100_000);
        assert_eq!(limits.selector_expansion_cap, 1_000);
    }
}
