//! Filter Broker Binary
//!
//! Runs the broker with configuration from `config/` and `FILTER_BROKER_*`
//! environment variables. No client transport is attached; deliveries are
//! logged.

use anyhow::Context;
use tokio::signal;
use tracing::info;

use filter_broker::config::ConfigManager;
use filter_broker::dispatch::{Delivery, LoggingObserver};
use filter_broker::execution::Broker;
use filter_broker::logging::init_structured_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load().context("failed to load broker configuration")?;
    info!(
        environment = %manager.environment(),
        "Starting filter broker"
    );

    let (broker, mut deliveries) = Broker::start(manager.config().clone(), Box::new(LoggingObserver))
        .await
        .context("failed to start broker")?;
    info!("Ready to accept worker connections on {}", broker.local_addr());

    let drain = tokio::spawn(async move {
        while let Some(delivery) = deliveries.recv().await {
            log_delivery(&delivery);
        }
    });

    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    broker.shutdown().await?;
    drain.abort();
    info!("Filter broker stopped");

    Ok(())
}

fn log_delivery(delivery: &Delivery) {
    info!(
        request_id = %delivery.metadata.request_id,
        return_host = %delivery.metadata.return_host,
        return_port = delivery.metadata.return_port,
        complete = delivery.complete,
        result = ?delivery.result,
        "Reply ready for client"
    );
}
