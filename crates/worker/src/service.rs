use std::sync::Arc;
use std::time::Duration;

use domainscout_domain::{
    JobStore, LogEntry, ScoutError, TaskMessage, TaskOutcome, TaskQueue, TaskReport,
    WorkerSnapshot, WorkerState,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Builder for [`WorkerService`], mirroring how the rest of the system wires
/// long-lived services.
pub struct WorkerServiceBuilder {
    worker_id: String,
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn JobStore>,
    runner: crate::TaskRunner,
    claim_timeout: Duration,
}

impl WorkerServiceBuilder {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn JobStore>,
        runner: crate::TaskRunner,
    ) -> Self {
        Self {
            worker_id: default_worker_id(),
            queue,
            store,
            runner,
            claim_timeout: Duration::from_secs(5),
        }
    }

    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn claim_timeout(mut self, claim_timeout: Duration) -> Self {
        self.claim_timeout = claim_timeout;
        self
    }

    pub fn build(self) -> WorkerService {
        WorkerService {
            worker_id: self.worker_id,
            queue: self.queue,
            store: self.store,
            runner: self.runner,
            claim_timeout: self.claim_timeout,
        }
    }
}

fn default_worker_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{host}-{:04x}", rand::random::<u16>())
}

/// One claim/process/record/ack loop. Several instances share the same queue
/// and store; the queue's claim semantics keep them from colliding.
pub struct WorkerService {
    worker_id: String,
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn JobStore>,
    runner: crate::TaskRunner,
    claim_timeout: Duration,
}

impl WorkerService {
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Runs until the shutdown channel fires. The signal is checked between
    /// claim attempts only; an in-flight claim or task always runs to
    /// completion, so shutdown latency is bounded by the claim timeout plus
    /// one task.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("worker {} started", self.worker_id);
        loop {
            // a claim cancelled mid-pop strands the popped task, so the
            // claim future is never raced against the shutdown signal
            match shutdown.try_recv() {
                Err(broadcast::error::TryRecvError::Empty) => {}
                _ => {
                    info!("worker {} shutting down", self.worker_id);
                    break;
                }
            }

            match self.queue.claim(&self.worker_id, self.claim_timeout).await {
                Ok(Some(task)) => self.process_task(task).await,
                Ok(None) => {
                    debug!("worker {} found no work", self.worker_id);
                }
                Err(e) => {
                    error!("worker {} claim failed: {}", self.worker_id, e);
                    // jittered backoff so a broken backend is not hammered in lockstep
                    let jitter = rand::random_range(0..500);
                    tokio::time::sleep(Duration::from_millis(1000 + jitter)).await;
                }
            }
        }
    }

    async fn process_task(&self, task: TaskMessage) {
        info!(
            "worker {} processing {} (job {})",
            self.worker_id, task.domain, task.job_id
        );

        let mut logs = vec![
            LogEntry::info(format!(
                "Worker {} started processing {}",
                self.worker_id, task.domain
            )),
            LogEntry::info(format!("Extracting profile from {}", task.domain)),
        ];

        self.snapshot(&task.job_id, Some(&task.domain), 10, WorkerState::Processing)
            .await;
        self.snapshot(&task.job_id, Some(&task.domain), 30, WorkerState::Processing)
            .await;

        let report = self.runner.execute(&task.domain).await;

        self.snapshot(&task.job_id, Some(&task.domain), 90, WorkerState::Processing)
            .await;

        let (outcome, final_state) = if report.is_success() {
            logs.push(LogEntry::success(format!(
                "{} processed successfully in {:.2}s",
                task.domain,
                report.duration_ms as f64 / 1000.0
            )));
            (TaskOutcome::Success, WorkerState::Complete)
        } else {
            logs.push(LogEntry::error(format!(
                "{} failed: {}",
                task.domain,
                report.error.as_deref().unwrap_or("unknown error")
            )));
            (TaskOutcome::Failure, WorkerState::Error)
        };

        self.record(&task, &report, logs).await;
        self.snapshot(&task.job_id, Some(&task.domain), 100, final_state)
            .await;

        if let Err(e) = self.queue.ack(&task.id, outcome).await {
            match e {
                // a redelivered task was already acked by the first claimer
                ScoutError::AlreadyAcked { .. } => {
                    debug!("task {} was already acked", task.id)
                }
                other => warn!(
                    "worker {} failed to ack task {}: {}",
                    self.worker_id, task.id, other
                ),
            }
        }

        self.snapshot(&task.job_id, None, 0, WorkerState::Idle).await;
    }

    async fn record(&self, task: &TaskMessage, report: &TaskReport, logs: Vec<LogEntry>) {
        match self.store.record_result(&task.job_id, report, logs).await {
            Ok(status) => {
                debug!(
                    "job {} is {} after {}",
                    task.job_id, status, task.domain
                );
            }
            // the job can expire out of the store while its last tasks drain
            Err(ScoutError::UnknownJob { .. }) => {
                warn!(
                    "job {} vanished before the result for {} landed",
                    task.job_id, task.domain
                );
            }
            Err(e) => {
                error!(
                    "worker {} could not record result for {}: {}",
                    self.worker_id, task.domain, e
                );
            }
        }
    }

    async fn snapshot(
        &self,
        job_id: &str,
        current_domain: Option<&str>,
        progress: u8,
        state: WorkerState,
    ) {
        let snapshot = WorkerSnapshot::new(
            &self.worker_id,
            current_domain.map(str::to_string),
            progress,
            state,
        );
        if let Err(e) = self.store.update_worker(job_id, snapshot).await {
            debug!("worker snapshot for job {} dropped: {}", job_id, e);
        }
    }
}

/// Spawns each worker loop on the runtime, all listening on the same
/// shutdown channel.
pub fn spawn_workers(
    services: Vec<WorkerService>,
    shutdown: &broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    services
        .into_iter()
        .map(|service| {
            let rx = shutdown.subscribe();
            tokio::spawn(async move { service.run(rx).await })
        })
        .collect()
}
