//! # Broker Runtime
//!
//! Wires the TCP worker listener, the per-connection tasks, the heartbeat
//! sweeper and the processor together.
//!
//! ```rust,no_run
//! use filter_broker::config::BrokerConfig;
//! use filter_broker::dispatch::{LoggingObserver, Metadata};
//! use filter_broker::execution::Broker;
//!
//! # async fn run() -> filter_broker::Result<()> {
//! let (broker, mut deliveries) = Broker::start(BrokerConfig::default(), Box::new(LoggingObserver)).await?;
//! let handle = broker.handle();
//!
//! let admission = handle
//!     .submit("thumbnail", Metadata::new("req-1", "10.0.0.7", 7100), b"image".to_vec())
//!     .await?;
//! if admission.is_accepted() {
//!     let delivery = deliveries.recv().await;
//!     println!("{delivery:?}");
//! }
//!
//! broker.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use futures::future::join_all;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use super::command::BrokerCommand;
use super::connection::serve_connection;
use super::heartbeat::run_heartbeat_sweeper;
use super::processor::BrokerProcessor;
use crate::config::BrokerConfig;
use crate::dispatch::{
    Admission, Delivery, Dispatcher, DispatcherConfig, DispatcherStats, FilterObserver, Metadata,
    Outbox, RejectionReason, SweepReport, WorkerId,
};
use crate::error::{BrokerError, Result};

/// Cloneable entry point for the client transport
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    commands: mpsc::Sender<BrokerCommand>,
    stats: Arc<RwLock<DispatcherStats>>,
}

impl BrokerHandle {
    /// Offer a unit of work. Never waits for queue space: a full command
    /// queue rejects the submission as [`RejectionReason::BrokerBusy`].
    pub async fn submit(
        &self,
        filter: impl Into<String>,
        metadata: Metadata,
        payload: Vec<u8>,
    ) -> Result<Admission> {
        let (resp, rx) = oneshot::channel();
        let command = BrokerCommand::Submit {
            filter: filter.into(),
            metadata,
            payload,
            resp,
        };

        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Command queue full, rejecting submission");
                return Ok(Admission::Rejected(RejectionReason::BrokerBusy));
            }
            Err(TrySendError::Closed(_)) => return Err(BrokerError::ProcessorClosed),
        }

        rx.await.map_err(|_| BrokerError::ProcessorClosed)
    }

    pub async fn stats(&self) -> Result<DispatcherStats> {
        let (resp, rx) = oneshot::channel();
        self.send(BrokerCommand::GetStats { resp }).await?;
        rx.await.map_err(|_| BrokerError::ProcessorClosed)
    }

    /// Run a heartbeat sweep now instead of waiting for the ticker
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        let (resp, rx) = oneshot::channel();
        self.send(BrokerCommand::Sweep { resp: Some(resp) }).await?;
        rx.await.map_err(|_| BrokerError::ProcessorClosed)
    }

    /// Last snapshot published by the processor, without a round trip
    pub fn stats_snapshot(&self) -> DispatcherStats {
        self.stats.read().clone()
    }

    async fn send(&self, command: BrokerCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BrokerError::ProcessorClosed)
    }
}

/// A running broker
pub struct Broker {
    config: BrokerConfig,
    local_addr: SocketAddr,
    handle: BrokerHandle,
    shutdown_tx: broadcast::Sender<()>,
    /// Accept loop and heartbeat sweeper
    tasks: Vec<JoinHandle<()>>,
    processor: JoinHandle<()>,
}

impl Broker {
    /// Bind the worker listener and start every background task.
    ///
    /// Returns the broker and the delivery queue the client transport drains.
    pub async fn start(
        config: BrokerConfig,
        observer: Box<dyn FilterObserver>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Delivery>)> {
        config.validate()?;

        info!("Starting filter broker on {}", config.bind_address);
        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|source| BrokerError::BindFailed {
                address: config.bind_address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let (outbox, deliveries) = Outbox::channel();
        let dispatcher = Dispatcher::new(DispatcherConfig::from(&config), outbox, observer);
        let (processor, command_tx) = BrokerProcessor::new(dispatcher, config.command_queue_size);
        let stats = processor.stats_handle();
        let processor = tokio::spawn(processor.run());

        let (shutdown_tx, _) = broadcast::channel(16);

        let accept = tokio::spawn(accept_connections(
            listener,
            command_tx.clone(),
            config.max_frame_len,
            shutdown_tx.clone(),
        ));
        let sweeper = tokio::spawn(run_heartbeat_sweeper(
            command_tx.clone(),
            config.sweep_interval(),
            shutdown_tx.subscribe(),
        ));

        info!("Filter broker listening on {}", local_addr);

        let broker = Self {
            config,
            local_addr,
            handle: BrokerHandle {
                commands: command_tx,
                stats,
            },
            shutdown_tx,
            tasks: vec![accept, sweeper],
            processor,
        };
        Ok((broker, deliveries))
    }

    pub fn handle(&self) -> BrokerHandle {
        self.handle.clone()
    }

    /// Address the worker listener actually bound, useful with port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Stop accepting workers, close every connection and stop the processor
    pub async fn shutdown(self) -> Result<()> {
        info!("Stopping filter broker gracefully");
        let grace = self.config.graceful_shutdown_timeout();

        let _ = self.shutdown_tx.send(());
        if timeout(grace, join_all(self.tasks)).await.is_err() {
            warn!("Background tasks did not stop within {:?}", grace);
        }

        let (resp, rx) = oneshot::channel();
        if self
            .handle
            .send(BrokerCommand::Shutdown { resp })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }

        match timeout(grace, self.processor).await {
            Ok(Ok(())) => {}
            Ok(Err(join_error)) => error!("Broker processor failed: {}", join_error),
            Err(_) => warn!("Broker processor did not stop within {:?}", grace),
        }

        info!("Filter broker stopped");
        Ok(())
    }
}

/// Accept worker connections until shutdown
async fn accept_connections(
    listener: TcpListener,
    commands: mpsc::Sender<BrokerCommand>,
    max_frame_len: u32,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => {
                        let worker_id = WorkerId::new();
                        info!(worker_id = %worker_id, peer = %peer, "New worker connection");
                        if let Err(error) = stream.set_nodelay(true) {
                            warn!(worker_id = %worker_id, error = %error, "Failed to set TCP_NODELAY");
                        }
                        tokio::spawn(serve_connection(
                            worker_id,
                            stream,
                            peer,
                            commands.clone(),
                            max_frame_len,
                            shutdown_tx.subscribe(),
                        ));
                    }
                    Err(error) => {
                        error!("Failed to accept connection: {}", error);
                    }
                }
            }

            _ = shutdown_rx.recv() => {
                info!("Connection acceptance loop shutting down");
                break;
            }
        }
    }
}
