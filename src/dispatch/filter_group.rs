//! One filter's worker pool, bounded backlog and live request.
//!
//! At most one unit is `live` per filter. Admission hedges: the unit goes to
//! every idle worker at once and the first authoritative reply wins. A new
//! admission that finds idle workers supersedes the live unit; workers still
//! holding a superseded unit are recycled onto whatever is live when their
//! reply lands.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::error::DispatchError;
use super::outbox::{Outbox, ReplyResult};
use super::wire::ReplyEnvelope;
use super::work_unit::SharedUnit;
use super::worker::{HeartbeatAction, WorkerHandle, WorkerId};
use crate::logging::log_dispatch_operation;

/// Outcome of offering a unit to a filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admission {
    /// Dispatched to `racers` idle workers and made live
    Accepted { racers: usize },
    /// No idle worker; queued at backlog depth `depth`
    Queued { depth: usize },
    Rejected(RejectionReason),
}

impl Admission {
    /// Whether the client should wait for a reply
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Admission::Rejected(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    BacklogFull { capacity: usize },
    FilterUnavailable,
    Unencodable { error: String },
    /// The processor's command queue was full
    BrokerBusy,
}

/// How a reply was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// Closed the live request; `refilled` when the worker took the next backlog unit
    Authoritative { refilled: bool },
    /// Reply for a superseded unit
    Stale { delivered: bool, reassigned: bool },
}

/// Result of one heartbeat pass over a group
#[derive(Debug, Default)]
pub struct HeartbeatSweep {
    pub probed: usize,
    pub expired: Vec<WorkerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub name: String,
    pub workers: usize,
    pub idle_workers: usize,
    pub backlog_depth: usize,
    pub live_request: Option<String>,
    /// Authoritative replies across the group's current workers
    pub units_completed: u64,
}

#[derive(Debug)]
pub struct FilterGroup {
    name: String,
    capacity: usize,
    backlog: VecDeque<SharedUnit>,
    workers: HashMap<WorkerId, WorkerHandle>,
    live: Option<SharedUnit>,
}

impl FilterGroup {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            backlog: VecDeque::with_capacity(capacity),
            workers: HashMap::new(),
            live: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn live(&self) -> Option<&SharedUnit> {
        self.live.as_ref()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn idle_count(&self) -> usize {
        self.workers.values().filter(|w| w.is_idle()).count()
    }

    pub fn worker(&self, id: &WorkerId) -> Option<&WorkerHandle> {
        self.workers.get(id)
    }

    pub fn worker_mut(&mut self, id: &WorkerId) -> Option<&mut WorkerHandle> {
        self.workers.get_mut(id)
    }

    pub fn workers(&self) -> impl Iterator<Item = &WorkerHandle> {
        self.workers.values()
    }

    /// Add a freshly registered worker. It starts idle; queued work is only
    /// promoted onto it when nothing is live.
    pub fn add_worker(&mut self, worker: WorkerHandle, now: Instant) {
        debug!(filter = %self.name, worker_id = %worker.id(), "Worker joins filter group");
        self.workers.insert(worker.id(), worker);
        self.promote_backlog(now);
    }

    /// Offer a unit: hedge it across every idle worker, else queue it, else reject.
    pub fn admit(&mut self, unit: SharedUnit, now: Instant) -> Admission {
        let racers = self.hedge(&unit, now);
        if racers > 0 {
            return Admission::Accepted { racers };
        }

        if self.backlog.len() < self.capacity {
            log_dispatch_operation(
                "enqueue",
                &self.name,
                Some(unit.request_id()),
                self.workers.len(),
                self.backlog.len() + 1,
            );
            self.backlog.push_back(unit);
            return Admission::Queued {
                depth: self.backlog.len(),
            };
        }

        warn!(
            filter = %self.name,
            request_id = %unit.request_id(),
            capacity = self.capacity,
            "Backlog full, rejecting submission"
        );
        Admission::Rejected(RejectionReason::BacklogFull {
            capacity: self.capacity,
        })
    }

    /// Apply a worker's reply.
    pub fn on_reply(
        &mut self,
        worker_id: WorkerId,
        reply: ReplyEnvelope,
        outbox: &Outbox,
        now: Instant,
    ) -> Result<ReplyDisposition, DispatchError> {
        let worker = self
            .workers
            .get_mut(&worker_id)
            .ok_or(DispatchError::UnknownConnection { worker_id })?;

        let Some(this) = worker.take_current() else {
            return Err(DispatchError::ProtocolViolation {
                worker_id,
                request_id: reply.request_id,
            });
        };

        if reply.request_id != this.request_id() {
            debug!(
                worker_id = %worker_id,
                held = %this.request_id(),
                replied = %reply.request_id,
                "Reply request id differs from the unit the worker holds"
            );
        }

        if self.live.as_ref() == Some(&this) {
            self.live = None;
            worker.record_completion();
            outbox.deliver(
                this.metadata().clone(),
                ReplyResult::Answer(reply.result_set),
                true,
            );

            // Refill is singular: only the worker that just finished takes the next unit
            let refilled = match self.backlog.pop_front() {
                Some(next) => {
                    self.live = Some(next.clone());
                    worker.send(next, now);
                    true
                }
                None => false,
            };

            return Ok(ReplyDisposition::Authoritative { refilled });
        }

        let delivered = reply.has_result();
        if delivered {
            outbox.deliver(
                this.metadata().clone(),
                ReplyResult::Answer(reply.result_set),
                false,
            );
        }

        let reassigned = match self.live.clone() {
            Some(live) => {
                worker.send(live, now);
                true
            }
            None => match self.backlog.pop_front() {
                Some(next) => {
                    self.live = Some(next.clone());
                    worker.send(next, now);
                    true
                }
                None => false,
            },
        };

        Ok(ReplyDisposition::Stale {
            delivered,
            reassigned,
        })
    }

    /// Remove a worker. If it was racing the live unit, the client gets a
    /// failure reply marked complete and the live slot is cleared.
    pub fn drop_worker(
        &mut self,
        worker_id: &WorkerId,
        reason: &str,
        outbox: &Outbox,
        now: Instant,
    ) -> Option<WorkerHandle> {
        let mut worker = self.workers.remove(worker_id)?;
        let held = worker.take_current();

        if let (Some(held), Some(live)) = (held.as_ref(), self.live.as_ref()) {
            if held == live {
                info!(
                    filter = %self.name,
                    worker_id = %worker_id,
                    request_id = %live.request_id(),
                    reason = %reason,
                    "Failing live request held by dropped worker"
                );
                outbox.deliver(
                    live.metadata().clone(),
                    ReplyResult::WorkerFailure {
                        reason: reason.to_string(),
                    },
                    true,
                );
                self.live = None;
            }
        }

        self.promote_backlog(now);
        Some(worker)
    }

    /// Answer everything still waiting with `FilterUnavailable`. Used when the
    /// last worker leaves and the group is discarded.
    pub fn flush_backlog(&mut self, outbox: &Outbox) -> usize {
        let mut flushed = 0;
        for unit in self.live.take().into_iter().chain(self.backlog.drain(..)) {
            outbox.deliver(
                unit.metadata().clone(),
                ReplyResult::FilterUnavailable {
                    filter: self.name.clone(),
                },
                true,
            );
            flushed += 1;
        }
        flushed
    }

    /// Probe overdue workers and report the ones that must be dropped
    pub fn sweep_heartbeats(&mut self, now: Instant, timeout: Duration) -> HeartbeatSweep {
        let mut sweep = HeartbeatSweep::default();
        for worker in self.workers.values_mut() {
            match worker.heartbeat_action(now, timeout) {
                HeartbeatAction::None => {}
                HeartbeatAction::Probe => {
                    worker.probe(now);
                    sweep.probed += 1;
                }
                HeartbeatAction::Drop => sweep.expired.push(worker.id()),
            }
        }
        sweep
    }

    pub fn stats(&self) -> FilterStats {
        FilterStats {
            name: self.name.clone(),
            workers: self.workers.len(),
            idle_workers: self.idle_count(),
            backlog_depth: self.backlog.len(),
            live_request: self.live.as_ref().map(|u| u.request_id().to_string()),
            units_completed: self.workers.values().map(WorkerHandle::units_completed).sum(),
        }
    }

    /// Send `unit` to every idle worker; it becomes live if anyone took it,
    /// superseding whatever was live before
    fn hedge(&mut self, unit: &SharedUnit, now: Instant) -> usize {
        let mut racers = 0;
        for worker in self.workers.values_mut().filter(|w| w.is_idle()) {
            worker.send(unit.clone(), now);
            racers += 1;
        }

        if racers > 0 {
            if let Some(previous) = self.live.replace(unit.clone()) {
                debug!(
                    filter = %self.name,
                    superseded = %previous.request_id(),
                    request_id = %unit.request_id(),
                    "Live unit superseded"
                );
            }
            log_dispatch_operation(
                "hedge",
                &self.name,
                Some(unit.request_id()),
                racers,
                self.backlog.len(),
            );
        }
        racers
    }

    /// When nothing is live, move the backlog front onto the idle workers
    fn promote_backlog(&mut self, now: Instant) {
        if self.live.is_some() || self.idle_count() == 0 {
            return;
        }
        if let Some(next) = self.backlog.pop_front() {
            self.hedge(&next, now);
        }
    }
}
