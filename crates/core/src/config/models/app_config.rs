use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{observability::LoggingConfig, redis::RedisConfig};
use crate::models::{KeySpace, NodeAddress, Priority};

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Prefix of every key the queue writes.
    pub key_prefix: String,
    pub default_timeout_seconds: f64,
    pub default_priority: Priority,
    /// Node used when a job is claimed without naming one.
    pub default_node: NodeAddress,
    pub redis: RedisConfig,
    pub logging: LoggingConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            key_prefix: "q".to_string(),
            default_timeout_seconds: 60.0,
            default_priority: Priority::Normal,
            default_node: NodeAddress::default(),
            redis: RedisConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl QueueConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format), if a path is given or a default file exists
    /// 3. Environment variable overrides (prefix: QLUSTER_, nested with `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = ConfigBuilder::try_from(&Self::default())
            .context("Failed to build default configuration")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("Config file not found: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = ["config/qluster.toml", "qluster.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("QLUSTER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: QueueConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: QueueConfig = toml::from_str(toml_str).context("Failed to parse TOML config")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config to TOML")
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.is_empty() {
            return Err(anyhow::anyhow!("Key prefix must not be empty"));
        }

        if !self.default_timeout_seconds.is_finite() || self.default_timeout_seconds <= 0.0 {
            return Err(anyhow::anyhow!(
                "Default timeout must be a positive number of seconds"
            ));
        }

        self.redis.validate().context("Invalid Redis configuration")?;
        self.logging
            .validate()
            .context("Invalid logging configuration")?;

        Ok(())
    }

    pub fn key_space(&self) -> KeySpace {
        KeySpace::new(self.key_prefix.clone())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.default_timeout_seconds)
    }
}
