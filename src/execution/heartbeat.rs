//! Heartbeat sweep ticker.

use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::command::BrokerCommand;

/// Ask the processor for a sweep every `period`, independently of traffic
pub(crate) async fn run_heartbeat_sweeper(
    commands: mpsc::Sender<BrokerCommand>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!(interval_ms = %period.as_millis(), "Starting heartbeat sweeper");

    // First tick one period out; a sweep at startup has nothing to find
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if commands.send(BrokerCommand::Sweep { resp: None }).await.is_err() {
                    debug!("Processor gone, stopping heartbeat sweeper");
                    break;
                }
            }

            _ = shutdown_rx.recv() => {
                debug!("Heartbeat sweeper shutting down");
                break;
            }
        }
    }
}
