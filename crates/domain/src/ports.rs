use std::time::Duration;

use async_trait::async_trait;

use crate::entities::{
    Job, JobStatus, JobView, LogEntry, ProcessingMode, TaskMessage, TaskOutcome, TaskReport,
    WorkerSnapshot,
};
use crate::errors::ScoutResult;

/// FIFO-ish work queue of `(job, domain)` items. Processing order across
/// workers is not guaranteed; the only hard property is that a task is
/// claimed by at most one worker at a time.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Atomically appends one task per domain, preserving domain order as
    /// the enqueue sequence.
    async fn enqueue(&self, job_id: &str, domains: &[String]) -> ScoutResult<()>;

    /// Blocks up to `timeout` for the next unclaimed task. A claim is
    /// immediately visible to concurrent callers; `None` means the queue
    /// stayed empty for the whole wait.
    async fn claim(&self, worker_id: &str, timeout: Duration) -> ScoutResult<Option<TaskMessage>>;

    /// Marks a claimed task terminal. Fails with `UnknownTask` if the task
    /// was never claimed here and `AlreadyAcked` on a second call.
    async fn ack(&self, task_id: &str, outcome: TaskOutcome) -> ScoutResult<()>;

    /// Returns claimed-but-unacked tasks whose lease expired to the pending
    /// queue. Returns how many were requeued.
    async fn requeue_expired(&self) -> ScoutResult<u32>;

    async fn pending_tasks(&self) -> ScoutResult<u32>;

    /// Cheap liveness probe for the mode selector.
    async fn ping(&self) -> bool;
}

/// Keyed per-job state with atomic increment/append semantics. All mutations
/// of a single job serialize against each other; different jobs may mutate
/// concurrently.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, domains: &[String], mode: ProcessingMode) -> ScoutResult<Job>;

    /// Deterministic `queued -> processing` trigger, called once enqueueing
    /// (or the sequential run) starts.
    async fn mark_processing(&self, job_id: &str) -> ScoutResult<()>;

    /// Records one domain's terminal result plus its log entries and returns
    /// the job status after the update. Idempotent: a duplicate delivery is
    /// logged as a warning and never double-counts.
    async fn record_result(
        &self,
        job_id: &str,
        report: &TaskReport,
        logs: Vec<LogEntry>,
    ) -> ScoutResult<JobStatus>;

    async fn append_log(&self, job_id: &str, entry: LogEntry) -> ScoutResult<()>;

    async fn update_worker(&self, job_id: &str, snapshot: WorkerSnapshot) -> ScoutResult<()>;

    /// Point-in-time snapshot; `UnknownJob` for a missing or expired id.
    async fn get_status(&self, job_id: &str) -> ScoutResult<JobView>;

    /// Drops jobs older than the retention window. Returns how many were
    /// reaped (0 for backends that expire keys natively).
    async fn reap_expired(&self) -> ScoutResult<u32>;
}

/// Output of the external per-domain pipeline collaborator.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Extracted company profile; the core treats this as opaque JSON.
    pub company_data: serde_json::Value,
}

/// The scrape/extract/persist collaborator. Treated as opaque, possibly slow
/// and possibly failing; the core never retries it.
#[async_trait]
pub trait DomainPipeline: Send + Sync {
    async fn process(&self, domain: &str) -> ScoutResult<PipelineOutput>;
}
