//! # System Constants
//!
//! Operational defaults and protocol limits for the broker. Configuration
//! values in [`crate::config::BrokerConfig`] default to the constants here.

/// Default values for every [`crate::config::BrokerConfig`] field
pub mod defaults {
    /// Address the worker listener binds to
    pub const BIND_ADDRESS: &str = "127.0.0.1:5560";

    /// Silence allowed before a worker is probed, and again before it is dropped
    pub const HEARTBEAT_TIMEOUT_MS: u64 = 60_000;

    /// Period of the heartbeat sweep
    pub const SWEEP_INTERVAL_MS: u64 = 60_000;

    /// Maximum queued units per filter before submissions are rejected
    pub const BACKLOG_CAPACITY: usize = 64;

    /// Depth of the processor command channel
    pub const COMMAND_QUEUE_SIZE: usize = 1024;

    /// Largest frame accepted from or sent to a worker (16 MiB)
    pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

    /// Time given to connection tasks to wind down on shutdown
    pub const GRACEFUL_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;
}

/// Wire protocol limits
pub mod protocol {
    /// Longest filter name a worker may register under, in bytes
    pub const MAX_FILTER_NAME_LEN: usize = 255;
}

/// Reasons attached to synthesized failure deliveries
pub mod failure_reasons {
    pub const HEARTBEAT_TIMEOUT: &str = "worker stopped answering heartbeats";
    pub const CONNECTION_CLOSED: &str = "worker connection closed";
}

/// Environment variable names read at startup
pub mod env {
    /// Prefix for configuration overrides, e.g. `FILTER_BROKER_BACKLOG_CAPACITY`
    pub const CONFIG_PREFIX: &str = "FILTER_BROKER";

    /// Deployment environment selector, checked before [`APP_ENV`]
    pub const BROKER_ENV: &str = "BROKER_ENV";

    pub const APP_ENV: &str = "APP_ENV";
}
