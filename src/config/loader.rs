//! Configuration Loader
//!
//! Environment-aware configuration loading built on the `config` crate.
//! Sources are layered lowest to highest precedence:
//!
//! 1. built-in defaults
//! 2. `<dir>/broker.toml`
//! 3. `<dir>/broker.<environment>.toml`
//! 4. `FILTER_BROKER_*` environment variables
//!
//! Missing files are skipped.

use super::error::{ConfigResult, ConfigurationError};
use super::BrokerConfig;
use crate::constants::env as env_vars;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded, validated broker configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: BrokerConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from `./config`
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_sources(config_dir, environment, env_vars::CONFIG_PREFIX)
    }

    /// Load configuration with an explicit environment-variable prefix.
    /// Tests use a unique prefix so they never observe each other's variables.
    pub fn load_with_sources(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_prefix: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading broker configuration"
        );

        let base = config_directory.join("broker.toml");
        let overlay = config_directory.join(format!("broker.{environment}.toml"));

        let merged = Config::builder()
            .add_source(File::from(base).required(false))
            .add_source(File::from(overlay).required(false))
            .add_source(Environment::with_prefix(env_prefix).try_parsing(true))
            .build()
            .map_err(|e| ConfigurationError::load_error(config_directory.display().to_string(), e))?;

        let config = Self::finish(merged)?;

        info!(
            environment = %environment,
            bind_address = %config.bind_address,
            heartbeat_timeout_ms = config.heartbeat_timeout_ms,
            backlog_capacity = config.backlog_capacity,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Load a single, required configuration file with no environment overlay
    pub fn load_from_file(path: &Path) -> ConfigResult<BrokerConfig> {
        if !path.exists() {
            return Err(ConfigurationError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let merged = Config::builder()
            .add_source(File::from(path))
            .build()
            .map_err(|e| ConfigurationError::load_error(path.display().to_string(), e))?;

        Self::finish(merged)
    }

    fn finish(merged: Config) -> ConfigResult<BrokerConfig> {
        let config: BrokerConfig =
            merged
                .try_deserialize()
                .map_err(|e| ConfigurationError::DeserializeError {
                    error: e.to_string(),
                })?;
        config.validate()?;
        Ok(config)
    }

    /// Detect the deployment environment from environment variables
    pub fn detect_environment() -> String {
        env::var(env_vars::BROKER_ENV)
            .or_else(|_| env::var(env_vars::APP_ENV))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }
}
