//! Application configuration.
//!
//! Aggregates producer and engine configuration into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod producer;

pub use producer::{ProducerConfig, DEFAULT_CHANNEL_BUFFER_SIZE, DEFAULT_MAX_MESSAGE_BYTES};

use serde::Deserialize;

use crate::engine::MemoryEngineConfig;
use crate::error::Result;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "sync-producer.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "SYNC_PRODUCER_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "SYNC_PRODUCER";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "SYNC_PRODUCER_LOG";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Producer behaviour.
    pub producer: ProducerConfig,
    /// In-process engine settings.
    pub engine: MemoryEngineConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `sync-producer.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document, without consulting the
    /// environment.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Configuration suitable for a sync producer: both outcome streams on.
    pub fn for_sync() -> Self {
        Self {
            producer: ProducerConfig::for_sync(),
            engine: MemoryEngineConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests;
