//! Outbound reply queue drained by the client transport.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use super::work_unit::Metadata;

/// What a client receives for its request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ReplyResult {
    /// A worker's result set, possibly empty
    Answer(Vec<serde_json::Value>),
    /// The worker racing the request was lost
    WorkerFailure { reason: String },
    /// No worker serves the filter any more
    FilterUnavailable { filter: String },
}

/// A ready-to-send reply. `complete` tells the transport the request is
/// conclusively answered and the client should stop waiting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub metadata: Metadata,
    pub result: ReplyResult,
    pub complete: bool,
}

/// Non-blocking producer side of the delivery queue
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl Outbox {
    /// Create an outbox together with the receiver the transport drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn deliver(&self, metadata: Metadata, result: ReplyResult, complete: bool) {
        let request_id = metadata.request_id.clone();
        if self
            .tx
            .send(Delivery {
                metadata,
                result,
                complete,
            })
            .is_err()
        {
            warn!(
                request_id = %request_id,
                complete = complete,
                "Delivery queue closed, dropping reply"
            );
        }
    }
}
