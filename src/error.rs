use std::io;

use crate::config::ConfigurationError;

/// Errors surfaced by the broker runtime
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to bind to address {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Broker processor is no longer running")]
    ProcessorClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
