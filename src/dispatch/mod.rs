//! # Hedged Dispatch
//!
//! Routing of client work units to worker pools grouped by filter name.
//!
//! ## Components
//!
//! - [`work_unit`]: request identity and the shared, pre-encoded unit
//! - [`wire`]: decoding of worker frames into [`InboundMessage`]
//! - [`worker`]: one connection's in-flight slot and heartbeat state
//! - [`filter_group`]: hedged admission, first-reply-wins and the bounded backlog
//! - [`dispatcher`]: registration, the inbound pump and the heartbeat sweep
//! - [`outbox`] / [`observer`]: what the client transport consumes

pub mod dispatcher;
pub mod error;
pub mod filter_group;
pub mod observer;
pub mod outbox;
pub mod wire;
pub mod work_unit;
pub mod worker;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherStats, SweepReport};
pub use error::DispatchError;
pub use filter_group::{Admission, FilterGroup, FilterStats, RejectionReason, ReplyDisposition};
pub use observer::{ChannelObserver, FilterAvailability, FilterObserver, LoggingObserver};
pub use outbox::{Delivery, Outbox, ReplyResult};
pub use wire::{DispatchEnvelope, InboundMessage, ReplyEnvelope, WireError};
pub use work_unit::{Metadata, SharedUnit, WorkUnit};
pub use worker::{HeartbeatAction, WorkerHandle, WorkerId, WorkerLink};
