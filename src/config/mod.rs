//! # Broker Configuration
//!
//! Configuration for the worker listener, heartbeat policy and per-filter
//! backpressure. Every field has a default, so an empty source set yields a
//! usable configuration; files and environment variables only override.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use filter_broker::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let timeout = manager.config().heartbeat_timeout();
//! println!("heartbeat timeout: {timeout:?}");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::constants::defaults;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root broker configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Worker listener bind address (e.g., "127.0.0.1:5560")
    pub bind_address: String,

    /// Silence allowed before a worker is probed, and again before it is dropped
    pub heartbeat_timeout_ms: u64,

    /// Heartbeat sweep period in milliseconds
    pub sweep_interval_ms: u64,

    /// Maximum queued units per filter
    pub backlog_capacity: usize,

    /// Processor command channel depth
    pub command_queue_size: usize,

    /// Largest frame accepted on a worker connection
    pub max_frame_len: u32,

    /// Graceful shutdown timeout in milliseconds
    pub graceful_shutdown_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_address: defaults::BIND_ADDRESS.to_string(),
            heartbeat_timeout_ms: defaults::HEARTBEAT_TIMEOUT_MS,
            sweep_interval_ms: defaults::SWEEP_INTERVAL_MS,
            backlog_capacity: defaults::BACKLOG_CAPACITY,
            command_queue_size: defaults::COMMAND_QUEUE_SIZE,
            max_frame_len: defaults::MAX_FRAME_LEN,
            graceful_shutdown_timeout_ms: defaults::GRACEFUL_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl BrokerConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_shutdown_timeout_ms)
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.bind_address.parse::<SocketAddr>().is_err() {
            return Err(ConfigurationError::invalid_value(
                "bind_address",
                self.bind_address.clone(),
                "must be a socket address such as 127.0.0.1:5560",
            ));
        }

        if self.heartbeat_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "heartbeat_timeout_ms",
                "0",
                "heartbeat timeout must be greater than 0",
            ));
        }

        if self.sweep_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "sweep_interval_ms",
                "0",
                "sweep interval must be greater than 0",
            ));
        }

        if self.backlog_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "backlog_capacity",
                "0",
                "backlog capacity must be greater than 0",
            ));
        }

        if self.command_queue_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "command_queue_size",
                "0",
                "command queue size must be greater than 0",
            ));
        }

        if self.max_frame_len == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_frame_len",
                "0",
                "max frame length must be greater than 0",
            ));
        }

        Ok(())
    }
}
