use std::sync::Arc;

use domainscout_domain::{JobStore, LogEntry, ScoutResult, WorkerSnapshot, WorkerState};
use tracing::{info, warn};

use crate::TaskRunner;

const SEQUENTIAL_WORKER_ID: &str = "sequential";

/// Processes a job's domains one at a time without touching the task queue.
/// Used when the queue backend is unavailable and as the explicit
/// single-threaded mode; it writes the same record shapes as the parallel
/// path so status consumers cannot tell the difference.
pub struct SequentialRunner {
    store: Arc<dyn JobStore>,
    runner: TaskRunner,
}

impl SequentialRunner {
    pub fn new(store: Arc<dyn JobStore>, runner: TaskRunner) -> Self {
        Self { store, runner }
    }

    pub async fn run(&self, job_id: &str, domains: &[String]) -> ScoutResult<()> {
        self.store.mark_processing(job_id).await?;
        self.store
            .append_log(
                job_id,
                LogEntry::info(format!("Starting to process {} domains", domains.len())),
            )
            .await?;

        let total = domains.len() as u32;
        let mut succeeded = 0u32;
        for (index, domain) in domains.iter().enumerate() {
            let progress = ((index as u32 * 100) / total.max(1)) as u8;
            self.snapshot(job_id, Some(domain), progress, WorkerState::Processing)
                .await;

            let logs = vec![LogEntry::info(format!("Extracting profile from {domain}"))];
            let report = self.runner.execute(domain).await;
            let mut logs = logs;
            if report.is_success() {
                succeeded += 1;
                logs.push(LogEntry::success(format!(
                    "{} processed successfully in {:.2}s",
                    domain,
                    report.duration_ms as f64 / 1000.0
                )));
            } else {
                logs.push(LogEntry::error(format!(
                    "{} failed: {}",
                    domain,
                    report.error.as_deref().unwrap_or("unknown error")
                )));
            }

            if let Err(e) = self.store.record_result(job_id, &report, logs).await {
                warn!("sequential result for {} not recorded: {}", domain, e);
            }
        }

        self.store
            .append_log(
                job_id,
                LogEntry::info(format!(
                    "Extraction complete: {} succeeded, {} failed",
                    succeeded,
                    total - succeeded
                )),
            )
            .await?;
        self.snapshot(job_id, None, 100, WorkerState::Complete).await;
        info!(
            "sequential run for job {} finished ({}/{} succeeded)",
            job_id, succeeded, total
        );
        Ok(())
    }

    async fn snapshot(
        &self,
        job_id: &str,
        current_domain: Option<&str>,
        progress: u8,
        state: WorkerState,
    ) {
        let snapshot = WorkerSnapshot::new(
            SEQUENTIAL_WORKER_ID,
            current_domain.map(str::to_string),
            progress,
            state,
        );
        if let Err(e) = self.store.update_worker(job_id, snapshot).await {
            warn!("worker snapshot for job {} dropped: {}", job_id, e);
        }
    }
}
