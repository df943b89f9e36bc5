//! # Dispatcher
//!
//! Top-level coordinator. Owns the connection registry, one [`FilterGroup`]
//! per servable filter, and the outbound [`Outbox`].
//!
//! Every operation here is synchronous. The processor task that owns the
//! dispatcher calls them one at a time, so choosing idle workers, marking
//! them busy and transmitting happen as one uninterrupted step.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::error::DispatchError;
use super::filter_group::{Admission, FilterGroup, FilterStats, RejectionReason};
use super::observer::FilterObserver;
use super::outbox::{Outbox, ReplyResult};
use super::wire::{self, InboundMessage};
use super::work_unit::{Metadata, SharedUnit, WorkUnit};
use super::worker::{WorkerHandle, WorkerId, WorkerLink};
use crate::config::BrokerConfig;
use crate::constants::failure_reasons;
use crate::logging::log_worker_operation;

/// Policy knobs the dispatcher needs from [`BrokerConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub heartbeat_timeout: Duration,
    pub backlog_capacity: usize,
}

impl From<&BrokerConfig> for DispatcherConfig {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            heartbeat_timeout: config.heartbeat_timeout(),
            backlog_capacity: config.backlog_capacity,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&BrokerConfig::default())
    }
}

/// Result of one heartbeat sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub dropped: Vec<WorkerId>,
}

/// Broker-wide snapshot
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub pending_connections: usize,
    pub registered_workers: usize,
    pub submissions_accepted: u64,
    pub submissions_queued: u64,
    pub submissions_rejected: u64,
    pub workers_dropped: u64,
    /// Sorted by filter name
    pub filters: Vec<FilterStats>,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: u64,
    queued: u64,
    rejected: u64,
    dropped: u64,
}

pub struct Dispatcher {
    config: DispatcherConfig,
    /// Open connections that have not sent their registration yet
    pending: HashMap<WorkerId, WorkerLink>,
    /// Registered worker to the filter it serves
    registry: HashMap<WorkerId, String>,
    groups: HashMap<String, FilterGroup>,
    outbox: Outbox,
    observer: Box<dyn FilterObserver>,
    counters: Counters,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .field("registered", &self.registry.len())
            .field("groups", &self.groups.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, outbox: Outbox, observer: Box<dyn FilterObserver>) -> Self {
        Self {
            config,
            pending: HashMap::new(),
            registry: HashMap::new(),
            groups: HashMap::new(),
            outbox,
            observer,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn group(&self, filter: &str) -> Option<&FilterGroup> {
        self.groups.get(filter)
    }

    pub fn is_servable(&self, filter: &str) -> bool {
        self.groups.contains_key(filter)
    }

    /// Filter a registered worker serves
    pub fn filter_of(&self, worker_id: &WorkerId) -> Option<&str> {
        self.registry.get(worker_id).map(String::as_str)
    }

    pub fn worker(&self, worker_id: &WorkerId) -> Option<&WorkerHandle> {
        let filter = self.registry.get(worker_id)?;
        self.groups.get(filter)?.worker(worker_id)
    }

    /// Track a new connection until its registration frame arrives
    pub fn connection_opened(&mut self, worker_id: WorkerId, link: WorkerLink) {
        debug!(worker_id = %worker_id, "Worker connection opened");
        self.pending.insert(worker_id, link);
    }

    /// The connection is gone; a registered worker is dropped like an
    /// unresponsive one.
    pub fn connection_closed(&mut self, worker_id: WorkerId, now: Instant) {
        if self.pending.remove(&worker_id).is_some() {
            debug!(worker_id = %worker_id, "Unregistered connection closed");
            return;
        }
        self.drop_worker(worker_id, failure_reasons::CONNECTION_CLOSED, now);
    }

    /// Inbound pump entry point: one frame from one connection
    pub fn handle_frame(
        &mut self,
        worker_id: WorkerId,
        payload: &[u8],
        now: Instant,
    ) -> Result<(), DispatchError> {
        if let Some(link) = self.pending.remove(&worker_id) {
            return match wire::decode_inbound(false, payload) {
                Ok(InboundMessage::Registration { filter_name }) => {
                    self.register(worker_id, link, filter_name, now);
                    Ok(())
                }
                // An unregistered frame only ever decodes as a registration
                Ok(_) => Ok(()),
                // Dropping `link` here closes the connection
                Err(source) => Err(DispatchError::MalformedRegistration { worker_id, source }),
            };
        }

        let Some(filter) = self.registry.get(&worker_id) else {
            return Err(DispatchError::UnknownConnection { worker_id });
        };
        let Some(group) = self.groups.get_mut(filter) else {
            return Err(DispatchError::UnknownConnection { worker_id });
        };

        match wire::decode_inbound(true, payload) {
            Ok(InboundMessage::Heartbeat) => {
                if let Some(worker) = group.worker_mut(&worker_id) {
                    worker.on_ack();
                }
                Ok(())
            }
            Ok(InboundMessage::Reply(reply)) => group
                .on_reply(worker_id, reply, &self.outbox, now)
                .map(|disposition| {
                    debug!(worker_id = %worker_id, ?disposition, "Reply applied");
                }),
            Ok(InboundMessage::Registration { .. }) => Ok(()),
            Err(source) => {
                if let Some(worker) = group.worker_mut(&worker_id) {
                    worker.on_ack();
                }
                Err(DispatchError::DecodeFailure { worker_id, source })
            }
        }
    }

    /// Client entry point: offer a unit to the filter's group
    pub fn submit(
        &mut self,
        filter: &str,
        metadata: Metadata,
        payload: Vec<u8>,
        now: Instant,
    ) -> Admission {
        let admission = self.admit(filter, metadata, payload, now);
        match &admission {
            Admission::Accepted { .. } => self.counters.accepted += 1,
            Admission::Queued { .. } => self.counters.queued += 1,
            Admission::Rejected(_) => self.counters.rejected += 1,
        }
        admission
    }

    /// Push a ready reply onto the outbound queue
    pub fn deliver(&self, metadata: Metadata, result: ReplyResult, complete: bool) {
        self.outbox.deliver(metadata, result, complete);
    }

    /// Heartbeat sweep: probe overdue workers, drop the ones already probed
    pub fn sweep(&mut self, now: Instant) -> SweepReport {
        let timeout = self.config.heartbeat_timeout;
        let mut report = SweepReport::default();
        let mut expired = Vec::new();

        for group in self.groups.values_mut() {
            let sweep = group.sweep_heartbeats(now, timeout);
            report.probed += sweep.probed;
            expired.extend(sweep.expired.into_iter().map(|id| (id, group.name().to_string())));
        }

        for (worker_id, filter) in expired {
            let error = DispatchError::WorkerUnresponsive { worker_id, filter };
            warn!(error = %error, "Dropping unresponsive worker");
            if self.drop_worker(worker_id, failure_reasons::HEARTBEAT_TIMEOUT, now) {
                report.dropped.push(worker_id);
            }
        }

        if report.probed > 0 || !report.dropped.is_empty() {
            debug!(
                probed = report.probed,
                dropped = report.dropped.len(),
                "Heartbeat sweep complete"
            );
        }
        report
    }

    pub fn stats(&self) -> DispatcherStats {
        let mut filters: Vec<FilterStats> = self.groups.values().map(FilterGroup::stats).collect();
        filters.sort_by(|a, b| a.name.cmp(&b.name));

        DispatcherStats {
            pending_connections: self.pending.len(),
            registered_workers: self.registry.len(),
            submissions_accepted: self.counters.accepted,
            submissions_queued: self.counters.queued,
            submissions_rejected: self.counters.rejected,
            workers_dropped: self.counters.dropped,
            filters,
        }
    }

    fn admit(&mut self, filter: &str, metadata: Metadata, payload: Vec<u8>, now: Instant) -> Admission {
        let Some(group) = self.groups.get_mut(filter) else {
            debug!(filter = %filter, request_id = %metadata.request_id, "No workers serve filter");
            return Admission::Rejected(RejectionReason::FilterUnavailable);
        };

        match SharedUnit::stage(WorkUnit::new(metadata, payload), filter) {
            Ok(unit) => group.admit(unit, now),
            Err(error) => {
                warn!(filter = %filter, error = %error, "Failed to encode submission");
                Admission::Rejected(RejectionReason::Unencodable {
                    error: error.to_string(),
                })
            }
        }
    }

    fn register(&mut self, worker_id: WorkerId, link: WorkerLink, filter: String, now: Instant) {
        let capacity = self.config.backlog_capacity;
        let group = match self.groups.entry(filter.clone()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                info!(filter = %filter, "Creating filter group");
                self.observer.on_filter_became_servable(&filter);
                entry.insert(FilterGroup::new(filter.clone(), capacity))
            }
        };

        group.add_worker(WorkerHandle::new(worker_id, filter.clone(), link, now), now);
        let details = format!("{} workers in group", group.worker_count());
        self.registry.insert(worker_id, filter.clone());

        log_worker_operation(
            "register",
            &worker_id.to_string(),
            Some(&filter),
            "registered",
            Some(&details),
        );
    }

    /// Remove a registered worker; discard its group once empty
    fn drop_worker(&mut self, worker_id: WorkerId, reason: &str, now: Instant) -> bool {
        let Some(filter) = self.registry.remove(&worker_id) else {
            return false;
        };
        let Some(group) = self.groups.get_mut(&filter) else {
            return false;
        };

        let dropped = group
            .drop_worker(&worker_id, reason, &self.outbox, now)
            .is_some();
        if dropped {
            self.counters.dropped += 1;
            log_worker_operation(
                "drop",
                &worker_id.to_string(),
                Some(&filter),
                "dropped",
                Some(reason),
            );
        }

        if group.is_empty() {
            if let Some(mut group) = self.groups.remove(&filter) {
                let flushed = group.flush_backlog(&self.outbox);
                info!(filter = %filter, flushed = flushed, "Filter group discarded");
            }
            self.observer.on_filter_became_unservable(&filter);
        }
        dropped
    }
}
