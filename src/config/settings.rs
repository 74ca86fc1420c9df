//! Application configuration loading.
//!
//! Provides the main [`Config`] struct that aggregates all settings. Every
//! section is optional; missing sections fall back to their defaults.
//!
//! # Example
//!
//! ```no_run
//! use poolkeeper::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use super::lifecycle::LifecycleConfig;
use super::logging::LoggingConfig;
use crate::error::{ConfigError, Result};

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging level and output format.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Connection lifecycle timing and capacity.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML,
    /// or fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid TOML or fails validation.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "logging.level",
            }
            .into());
        }
        self.lifecycle.validate()
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::parse_toml("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.lifecycle, LifecycleConfig::default());
    }

    #[test]
    fn parses_sections() {
        let config = Config::parse_toml(
            r#"
            [logging]
            level = "debug"
            format = "json"

            [lifecycle]
            max_connections_per_account = 8
            health_check_interval_ms = 1000
            "#,
        )
        .unwrap();
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.lifecycle.max_connections_per_account, 8);
        assert_eq!(config.lifecycle.health_check_interval_ms, 1000);
    }

    #[test]
    fn rejects_invalid_lifecycle_values() {
        let result = Config::parse_toml(
            r#"
            [lifecycle]
            memory_cleanup_interval_ms = 0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_malformed_toml() {
        let result = Config::parse_toml("[lifecycle\nmax = ");
        assert!(matches!(
            result,
            Err(crate::error::Error::Config(ConfigError::Parse(_)))
        ));
    }
}
