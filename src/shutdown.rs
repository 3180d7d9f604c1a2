use tokio::sync::broadcast;
use tracing::{debug, info};

/// Graceful-shutdown fanout. Subsystems subscribe once at startup; a single
/// `shutdown()` call reaches all of them.
pub struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self { shutdown_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown(&self) {
        let subscribers = self.shutdown_tx.receiver_count();
        debug!("sending shutdown signal to {} subscribers", subscribers);
        // no receivers left is fine, everything already stopped
        let _ = self.shutdown_tx.send(());
        info!("shutdown signal sent");
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
