//! In-process dispatcher fixture with a controllable clock.

use bytes::Bytes;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use filter_broker::dispatch::{
    Admission, ChannelObserver, Delivery, DispatchError, Dispatcher, DispatcherConfig,
    FilterAvailability, Metadata, WorkerId, WorkerLink,
};

pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct DispatchHarness {
    pub dispatcher: Dispatcher,
    pub deliveries: mpsc::UnboundedReceiver<Delivery>,
    pub availability: mpsc::UnboundedReceiver<FilterAvailability>,
    pub outbound: HashMap<WorkerId, mpsc::UnboundedReceiver<Bytes>>,
    pub now: Instant,
}

impl DispatchHarness {
    pub fn new(backlog_capacity: usize) -> Self {
        let (outbox, deliveries) = filter_broker::dispatch::Outbox::channel();
        let (observer, availability) = ChannelObserver::channel();
        let config = DispatcherConfig {
            heartbeat_timeout: HEARTBEAT_TIMEOUT,
            backlog_capacity,
        };

        Self {
            dispatcher: Dispatcher::new(config, outbox, Box::new(observer)),
            deliveries,
            availability,
            outbound: HashMap::new(),
            now: Instant::now(),
        }
    }

    /// Open a connection and register it for `filter`
    pub fn connect(&mut self, filter: &str) -> WorkerId {
        let worker_id = WorkerId::new();
        let (link, rx) = WorkerLink::channel();
        self.dispatcher.connection_opened(worker_id, link);
        self.dispatcher
            .handle_frame(worker_id, filter.as_bytes(), self.now)
            .expect("registration accepted");
        self.outbound.insert(worker_id, rx);
        worker_id
    }

    pub fn disconnect(&mut self, worker_id: WorkerId) {
        self.dispatcher.connection_closed(worker_id, self.now);
        self.outbound.remove(&worker_id);
    }

    pub fn submit(&mut self, filter: &str, request_id: &str) -> Admission {
        self.dispatcher.submit(
            filter,
            Metadata::new(request_id, "client.test", 7000),
            request_id.as_bytes().to_vec(),
            self.now,
        )
    }

    pub fn reply(
        &mut self,
        worker_id: WorkerId,
        request_id: &str,
        results: Value,
    ) -> Result<(), DispatchError> {
        let payload = json!({
            "request_id": request_id,
            "result_set": results,
            "filter_name": self.dispatcher.filter_of(&worker_id).unwrap_or_default(),
        })
        .to_string();
        self.dispatcher
            .handle_frame(worker_id, payload.as_bytes(), self.now)
    }

    pub fn heartbeat(&mut self, worker_id: WorkerId) -> Result<(), DispatchError> {
        self.dispatcher.handle_frame(worker_id, b"", self.now)
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Request id the worker currently holds
    pub fn holding(&self, worker_id: WorkerId) -> Option<String> {
        self.dispatcher
            .worker(&worker_id)
            .and_then(|worker| worker.current())
            .map(|unit| unit.request_id().to_string())
    }

    pub fn live(&self, filter: &str) -> Option<String> {
        self.dispatcher
            .group(filter)
            .and_then(|group| group.live())
            .map(|unit| unit.request_id().to_string())
    }

    pub fn drain_deliveries(&mut self) -> Vec<Delivery> {
        let mut drained = Vec::new();
        while let Ok(delivery) = self.deliveries.try_recv() {
            drained.push(delivery);
        }
        drained
    }

    /// Frames transmitted to a worker since the last call
    pub fn drain_outbound(&mut self, worker_id: WorkerId) -> Vec<Bytes> {
        let mut drained = Vec::new();
        if let Some(rx) = self.outbound.get_mut(&worker_id) {
            while let Ok(frame) = rx.try_recv() {
                drained.push(frame);
            }
        }
        drained
    }
}
