//! Commands accepted by the broker processor.
//!
//! Connection tasks, the heartbeat sweeper and [`super::BrokerHandle`] never
//! touch dispatcher state directly; they send one of these and, where a
//! result is needed, wait on the attached responder.

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::dispatch::{Admission, DispatcherStats, Metadata, SweepReport, WorkerId, WorkerLink};

/// Type alias for command response channels
pub type CommandResponder<T> = oneshot::Sender<T>;

#[derive(Debug)]
pub enum BrokerCommand {
    /// A worker connected; `link` feeds its writer
    ConnectionOpened { worker_id: WorkerId, link: WorkerLink },
    /// One inbound frame, in connection order
    Frame { worker_id: WorkerId, payload: Bytes },
    /// The connection's reader stopped
    ConnectionClosed { worker_id: WorkerId },
    /// Client work for `filter`
    Submit {
        filter: String,
        metadata: Metadata,
        payload: Vec<u8>,
        resp: CommandResponder<Admission>,
    },
    /// Heartbeat sweep; the ticker sends it without a responder
    Sweep {
        resp: Option<CommandResponder<SweepReport>>,
    },
    GetStats {
        resp: CommandResponder<DispatcherStats>,
    },
    /// Stop the processor; the dispatcher and every worker link are dropped
    Shutdown { resp: CommandResponder<()> },
}

impl BrokerCommand {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            BrokerCommand::ConnectionOpened { .. } => "connection_opened",
            BrokerCommand::Frame { .. } => "frame",
            BrokerCommand::ConnectionClosed { .. } => "connection_closed",
            BrokerCommand::Submit { .. } => "submit",
            BrokerCommand::Sweep { .. } => "sweep",
            BrokerCommand::GetStats { .. } => "get_stats",
            BrokerCommand::Shutdown { .. } => "shutdown",
        }
    }
}
