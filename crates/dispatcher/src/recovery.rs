use std::sync::Arc;
use std::time::Duration;

use domainscout_domain::{JobStore, TaskQueue};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Periodic janitor: returns tasks whose claim lease expired to the pending
/// queue and drops job records past their retention window. Crashed workers
/// therefore lose at most one lease interval of progress.
pub struct RecoveryService {
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn JobStore>,
    interval: Duration,
}

impl RecoveryService {
    pub fn new(queue: Arc<dyn TaskQueue>, store: Arc<dyn JobStore>, interval: Duration) -> Self {
        Self {
            queue,
            store,
            interval,
        }
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            "recovery loop started, sweeping every {}s",
            self.interval.as_secs()
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick fires immediately, skip it
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("recovery loop shutting down");
                    break;
                }
                _ = ticker.tick() => self.sweep().await,
            }
        }
    }

    pub async fn sweep(&self) {
        match self.queue.requeue_expired().await {
            Ok(0) => debug!("recovery sweep found no expired claims"),
            Ok(n) => info!("recovery sweep requeued {} expired claims", n),
            Err(e) => warn!("claim requeue sweep failed: {}", e),
        }
        match self.store.reap_expired().await {
            Ok(0) => {}
            Ok(n) => info!("recovery sweep reaped {} expired jobs", n),
            Err(e) => warn!("job reap sweep failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domainscout_domain::ProcessingMode;
    use domainscout_infrastructure::{MemoryJobStore, MemoryTaskQueue};

    #[tokio::test]
    async fn sweep_requeues_expired_claims_and_reaps_old_jobs() {
        let queue = Arc::new(MemoryTaskQueue::new(Duration::from_millis(10)));
        let store = Arc::new(MemoryJobStore::new(0, 200));

        let domains = vec!["a.com".to_string()];
        let job = store
            .create_job(&domains, ProcessingMode::Parallel)
            .await
            .unwrap();
        queue.enqueue(&job.id, &domains).await.unwrap();
        queue
            .claim("w1", Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let recovery = RecoveryService::new(
            Arc::clone(&queue) as _,
            Arc::clone(&store) as _,
            Duration::from_secs(30),
        );
        recovery.sweep().await;

        assert_eq!(queue.pending_tasks().await.unwrap(), 1);
        assert!(store.get_status(&job.id).await.is_err());
    }
}
