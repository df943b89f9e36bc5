use super::wire::WireError;
use super::worker::WorkerId;

/// Faults raised while processing worker traffic.
///
/// None of these escalate: by the time one is returned the dispatcher has
/// already applied its recovery, and the caller only logs it.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Heartbeat deadline missed; the worker was dropped
    #[error("Worker {worker_id} on filter '{filter}' stopped responding")]
    WorkerUnresponsive { worker_id: WorkerId, filter: String },

    /// First frame was not a filter name; the connection was closed
    #[error("Worker {worker_id} sent a malformed registration: {source}")]
    MalformedRegistration {
        worker_id: WorkerId,
        #[source]
        source: WireError,
    },

    /// Reply could not be decoded; it was treated as a heartbeat ack
    #[error("Worker {worker_id} sent an undecodable reply: {source}")]
    DecodeFailure {
        worker_id: WorkerId,
        #[source]
        source: WireError,
    },

    /// Reply arrived while the worker held no unit; it was discarded
    #[error("Worker {worker_id} replied to '{request_id}' with no unit outstanding")]
    ProtocolViolation {
        worker_id: WorkerId,
        request_id: String,
    },

    /// Frame from a connection that was never opened or was already dropped
    #[error("Frame from unknown connection {worker_id}")]
    UnknownConnection { worker_id: WorkerId },
}
