//! # Broker Processor
//!
//! The single task that owns the [`Dispatcher`]. Every mutation of broker
//! state arrives here as a [`BrokerCommand`] and is applied to completion
//! before the next one is received, so no dispatcher operation ever
//! interleaves with another.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::command::BrokerCommand;
use crate::dispatch::{DispatchError, Dispatcher, DispatcherStats};
use crate::logging::log_error;

pub struct BrokerProcessor {
    dispatcher: Dispatcher,

    /// Command receiver channel
    command_rx: mpsc::Receiver<BrokerCommand>,

    /// Snapshot republished after every command
    stats: Arc<RwLock<DispatcherStats>>,
}

impl BrokerProcessor {
    pub fn new(dispatcher: Dispatcher, buffer_size: usize) -> (Self, mpsc::Sender<BrokerCommand>) {
        let (command_tx, command_rx) = mpsc::channel(buffer_size);
        let stats = Arc::new(RwLock::new(dispatcher.stats()));

        let processor = Self {
            dispatcher,
            command_rx,
            stats,
        };

        (processor, command_tx)
    }

    pub fn stats_handle(&self) -> Arc<RwLock<DispatcherStats>> {
        self.stats.clone()
    }

    /// Run until shutdown is requested or every sender is gone
    pub async fn run(mut self) {
        info!("Broker processor started");

        while let Some(command) = self.command_rx.recv().await {
            if !self.process_command(command) {
                break;
            }
            *self.stats.write() = self.dispatcher.stats();
        }

        info!("Broker processor stopped");
    }

    /// Apply one command. Returns false when the loop should stop.
    fn process_command(&mut self, command: BrokerCommand) -> bool {
        let now = Instant::now();
        debug!(command = command.kind(), "Processing broker command");

        match command {
            BrokerCommand::ConnectionOpened { worker_id, link } => {
                self.dispatcher.connection_opened(worker_id, link);
            }
            BrokerCommand::Frame { worker_id, payload } => {
                if let Err(error) = self.dispatcher.handle_frame(worker_id, &payload, now) {
                    report_dispatch_error(&error);
                }
            }
            BrokerCommand::ConnectionClosed { worker_id } => {
                self.dispatcher.connection_closed(worker_id, now);
            }
            BrokerCommand::Submit {
                filter,
                metadata,
                payload,
                resp,
            } => {
                let admission = self.dispatcher.submit(&filter, metadata, payload, now);
                let _ = resp.send(admission);
            }
            BrokerCommand::Sweep { resp } => {
                let report = self.dispatcher.sweep(now);
                if let Some(resp) = resp {
                    let _ = resp.send(report);
                }
            }
            BrokerCommand::GetStats { resp } => {
                let _ = resp.send(self.dispatcher.stats());
            }
            BrokerCommand::Shutdown { resp } => {
                let _ = resp.send(());
                return false;
            }
        }
        true
    }
}

fn report_dispatch_error(error: &DispatchError) {
    match error {
        DispatchError::UnknownConnection { .. } => debug!(error = %error, "Ignoring frame"),
        DispatchError::DecodeFailure { .. } => {
            log_error("dispatcher", "decode_reply", &error.to_string(), None)
        }
        _ => warn!(error = %error, "Worker traffic rejected"),
    }
}
