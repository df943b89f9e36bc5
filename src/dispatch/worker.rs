//! Per-connection worker state: identity, the single in-flight slot and
//! heartbeat bookkeeping.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use super::wire;
use super::work_unit::SharedUnit;

/// Stable identity of one worker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound half of a worker connection.
///
/// Pushing a frame never waits; the connection's writer task drains the
/// queue. Dropping every clone of the link closes the connection.
#[derive(Debug, Clone)]
pub struct WorkerLink {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl WorkerLink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a frame for the writer; false when the connection is gone
    pub fn transmit(&self, frame: Bytes) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// What the heartbeat sweep should do with a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    None,
    Probe,
    Drop,
}

/// One registered worker
#[derive(Debug)]
pub struct WorkerHandle {
    id: WorkerId,
    filter: String,
    link: WorkerLink,
    current: Option<SharedUnit>,
    last_sent_at: Instant,
    awaiting_heartbeat_ack: bool,
    /// Set when a probe went out while `current` was held; a second
    /// deadline on the same unit is fatal.
    probed_while_busy: bool,
    units_completed: u64,
}

impl WorkerHandle {
    pub fn new(id: WorkerId, filter: impl Into<String>, link: WorkerLink, now: Instant) -> Self {
        Self {
            id,
            filter: filter.into(),
            link,
            current: None,
            last_sent_at: now,
            awaiting_heartbeat_ack: false,
            probed_while_busy: false,
            units_completed: 0,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn current(&self) -> Option<&SharedUnit> {
        self.current.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    pub fn is_racing(&self, unit: &SharedUnit) -> bool {
        self.current.as_ref() == Some(unit)
    }

    pub fn awaiting_heartbeat_ack(&self) -> bool {
        self.awaiting_heartbeat_ack
    }

    pub fn last_sent_at(&self) -> Instant {
        self.last_sent_at
    }

    pub fn units_completed(&self) -> u64 {
        self.units_completed
    }

    /// Hand the worker a unit and transmit it.
    ///
    /// Callers only send to a worker whose previous unit has resolved; the
    /// slot must be empty.
    pub fn send(&mut self, unit: SharedUnit, now: Instant) {
        debug_assert!(
            self.current.is_none(),
            "worker {} given a second unit while one is in flight",
            self.id
        );

        let frame = unit.frame();
        debug!(
            worker_id = %self.id,
            request_id = %unit.request_id(),
            "Sending unit to worker"
        );
        self.current = Some(unit);
        self.probed_while_busy = false;
        self.last_sent_at = now;

        if !self.link.transmit(frame) {
            // The connection task reports the close; the worker is dropped then.
            warn!(worker_id = %self.id, "Worker link closed while sending unit");
        }
    }

    /// Transmit a zero-length heartbeat probe
    pub fn probe(&mut self, now: Instant) {
        self.awaiting_heartbeat_ack = true;
        self.probed_while_busy = self.current.is_some();
        self.last_sent_at = now;

        if !self.link.transmit(wire::heartbeat_frame()) {
            warn!(worker_id = %self.id, "Worker link closed while probing");
        }
    }

    pub fn on_ack(&mut self) {
        self.awaiting_heartbeat_ack = false;
    }

    /// Resolve the in-flight slot, returning the unit that was held
    pub fn take_current(&mut self) -> Option<SharedUnit> {
        self.probed_while_busy = false;
        self.current.take()
    }

    pub fn record_completion(&mut self) {
        self.units_completed += 1;
    }

    /// Past the deadline with either a probe or work outstanding
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.deadline_passed(now, timeout)
            && (self.awaiting_heartbeat_ack || self.current.is_some())
    }

    /// Probe-before-kill: a stale worker is dropped only once a probe went
    /// unanswered or its outstanding unit already outlived one. An idle,
    /// unprobed worker past the deadline is not stale and is only probed.
    pub fn heartbeat_action(&self, now: Instant, timeout: Duration) -> HeartbeatAction {
        if self.is_stale(now, timeout) {
            if self.awaiting_heartbeat_ack || self.probed_while_busy {
                HeartbeatAction::Drop
            } else {
                HeartbeatAction::Probe
            }
        } else if self.deadline_passed(now, timeout) {
            HeartbeatAction::Probe
        } else {
            HeartbeatAction::None
        }
    }

    fn deadline_passed(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_sent_at) >= timeout
    }
}
