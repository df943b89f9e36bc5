//! Filter availability callbacks for the client transport.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Notified whenever a filter group is created or destroyed
pub trait FilterObserver: Send {
    fn on_filter_became_servable(&mut self, name: &str);
    fn on_filter_became_unservable(&mut self, name: &str);
}

/// Observer that only logs transitions
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl FilterObserver for LoggingObserver {
    fn on_filter_became_servable(&mut self, name: &str) {
        info!(filter = %name, "Filter is now servable");
    }

    fn on_filter_became_unservable(&mut self, name: &str) {
        info!(filter = %name, "Filter is no longer servable");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterAvailability {
    Servable(String),
    Unservable(String),
}

/// Observer that forwards transitions onto a channel
#[derive(Debug)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<FilterAvailability>,
}

impl ChannelObserver {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FilterAvailability>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn publish(&self, event: FilterAvailability) {
        if self.tx.send(event).is_err() {
            debug!("Filter availability receiver dropped");
        }
    }
}

impl FilterObserver for ChannelObserver {
    fn on_filter_became_servable(&mut self, name: &str) {
        self.publish(FilterAvailability::Servable(name.to_string()));
    }

    fn on_filter_became_unservable(&mut self, name: &str) {
        self.publish(FilterAvailability::Unservable(name.to_string()));
    }
}
