use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use domainscout_domain::{ProcessingMode, TaskQueue};
use tracing::{info, warn};

/// Decides between parallel and sequential processing from the queue
/// backend's availability. The answer is probed once at startup and cached;
/// a failed enqueue downgrades it, an explicit reprobe can restore it.
pub struct ModeSelector {
    queue: Arc<dyn TaskQueue>,
    parallel_available: AtomicBool,
}

impl ModeSelector {
    /// Probes the queue once and caches the verdict.
    pub async fn probe(queue: Arc<dyn TaskQueue>, timeout: Duration) -> Self {
        let available = matches!(
            tokio::time::timeout(timeout, queue.ping()).await,
            Ok(true)
        );
        if available {
            info!("queue backend reachable, parallel mode available");
        } else {
            warn!("queue backend unreachable, falling back to sequential mode");
        }
        Self {
            queue,
            parallel_available: AtomicBool::new(available),
        }
    }

    /// Selector for a deployment whose queue backend failed to construct.
    pub fn degraded(queue: Arc<dyn TaskQueue>) -> Self {
        warn!("starting with parallel mode disabled");
        Self {
            queue,
            parallel_available: AtomicBool::new(false),
        }
    }

    pub fn parallel_available(&self) -> bool {
        self.parallel_available.load(Ordering::Relaxed)
    }

    /// Mode used when the caller expresses no preference.
    pub fn current(&self) -> ProcessingMode {
        if self.parallel_available() {
            ProcessingMode::Parallel
        } else {
            ProcessingMode::Sequential
        }
    }

    /// Called after a backend failure mid-flight; new submissions go
    /// sequential until a reprobe succeeds.
    pub fn downgrade(&self) {
        if self.parallel_available.swap(false, Ordering::Relaxed) {
            warn!("queue backend lost, downgrading to sequential mode");
        }
    }

    /// Re-pings the backend and updates the cached verdict.
    pub async fn reprobe(&self) -> bool {
        let available = self.queue.ping().await;
        let was = self.parallel_available.swap(available, Ordering::Relaxed);
        if available && !was {
            info!("queue backend recovered, parallel mode restored");
        }
        available
    }
}
