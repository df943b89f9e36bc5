#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Filter Broker
//!
//! Hedged work-dispatch broker between client transports and a dynamic pool
//! of engine workers.
//!
//! ## Overview
//!
//! Workers connect over TCP and register for a single named capability, a
//! *filter*. Client work tagged with a filter name is raced across every idle
//! worker of that filter; the first authoritative reply is delivered to the
//! client as complete, late replies are surfaced as incomplete.
//!
//! ## Key Features
//!
//! - **Hedged dispatch**: one unit goes to every idle worker at once
//! - **Single in-flight unit per worker**: a worker never holds two units
//! - **Bounded backlog**: admission fails closed instead of blocking
//! - **Probe-before-kill heartbeats**: silent workers are probed once, then dropped
//! - **Actor ownership**: one processor task owns all dispatch state, no locks
//!
//! ## Module Organization
//!
//! - [`dispatch`] - Work units, worker state, filter groups and the dispatcher
//! - [`execution`] - TCP listener, connection tasks, processor and heartbeat sweeper
//! - [`config`] - Layered configuration loading
//! - [`logging`] - Structured logging setup
//! - [`error`] - Runtime error type
//! - [`constants`] - Defaults and protocol limits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use filter_broker::config::ConfigManager;
//! use filter_broker::dispatch::LoggingObserver;
//! use filter_broker::execution::Broker;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! filter_broker::logging::init_structured_logging();
//! let manager = ConfigManager::load()?;
//!
//! let (broker, mut deliveries) =
//!     Broker::start(manager.config().clone(), Box::new(LoggingObserver)).await?;
//! println!("workers connect to {}", broker.local_addr());
//!
//! while let Some(delivery) = deliveries.recv().await {
//!     println!("reply for {}", delivery.metadata.request_id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod execution;
pub mod logging;

pub use config::{BrokerConfig, ConfigManager, ConfigurationError};
pub use dispatch::{
    Admission, Delivery, DispatchError, Dispatcher, FilterObserver, Metadata, ReplyResult,
    WorkUnit,
};
pub use error::{BrokerError, Result};
pub use execution::{Broker, BrokerHandle};
