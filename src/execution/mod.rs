//! Tokio runtime around the dispatcher: TCP worker connections, the
//! processor task and the heartbeat sweeper.

pub mod broker;
pub mod command;
pub mod connection;
pub mod framing;
pub mod heartbeat;
pub mod processor;

pub use broker::{Broker, BrokerHandle};
pub use command::{BrokerCommand, CommandResponder};
pub use processor::BrokerProcessor;
