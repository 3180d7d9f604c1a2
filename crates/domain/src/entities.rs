use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ScoutError;

/// Which path a submission took through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    Parallel,
    Sequential,
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingMode::Parallel => write!(f, "parallel"),
            ProcessingMode::Sequential => write!(f, "sequential"),
        }
    }
}

/// Job lifecycle: `Queued -> Processing -> {Completed, CompletedWithFailures}`.
/// Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    CompletedWithFailures,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::CompletedWithFailures)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::CompletedWithFailures => write!(f, "completed_with_failures"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One entry in a job's merged log stream. Appended by workers and the
/// dispatcher, ordered by append time per writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

/// Wire format for one unit of work on the task queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub id: String,
    pub job_id: String,
    pub domain: String,
    /// Enqueue position within the job, used as a display tie-break only.
    pub sequence: u32,
    pub queued_at: DateTime<Utc>,
    pub worker_id: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl TaskMessage {
    pub fn new(job_id: impl Into<String>, domain: impl Into<String>, sequence: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            domain: domain.into(),
            sequence,
            queued_at: Utc::now(),
            worker_id: None,
            claimed_at: None,
        }
    }

    pub fn claimed_by(mut self, worker_id: &str) -> Self {
        self.worker_id = Some(worker_id.to_string());
        self.claimed_at = Some(Utc::now());
        self
    }

    /// Strips claim metadata so the task can go back on the pending queue.
    pub fn released(mut self) -> Self {
        self.worker_id = None;
        self.claimed_at = None;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Per-task timeout bound exceeded.
    Timeout,
    /// The pipeline collaborator reported a domain-level error.
    Pipeline,
    /// The pipeline call itself blew up (panic, join failure).
    Internal,
}

/// Terminal result of one domain's processing, written exactly once per
/// domain into the job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub domain: String,
    pub outcome: TaskOutcome,
    pub failure_kind: Option<FailureKind>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl TaskReport {
    pub fn success(domain: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            domain: domain.into(),
            outcome: TaskOutcome::Success,
            failure_kind: None,
            error: None,
            duration_ms,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(
        domain: impl Into<String>,
        kind: FailureKind,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            domain: domain.into(),
            outcome: TaskOutcome::Failure,
            failure_kind: Some(kind),
            error: Some(error.into()),
            duration_ms,
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == TaskOutcome::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Processing,
    Complete,
    Error,
}

/// Point-in-time view of one worker, keyed by worker id in the job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub worker_id: String,
    pub current_domain: Option<String>,
    /// Coarse progress through the current task, 0-100.
    pub progress: u8,
    pub state: WorkerState,
    pub updated_at: DateTime<Utc>,
}

impl WorkerSnapshot {
    pub fn new(
        worker_id: impl Into<String>,
        current_domain: Option<String>,
        progress: u8,
        state: WorkerState,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            current_domain,
            progress,
            state,
            updated_at: Utc::now(),
        }
    }

    pub fn idle(worker_id: impl Into<String>) -> Self {
        Self::new(worker_id, None, 0, WorkerState::Idle)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMetrics {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub domain_timings_ms: HashMap<String, u64>,
}

/// Authoritative per-job state. Mutated only through [`Job::apply_result`]
/// and the append helpers so the count invariant
/// `completed + failed + pending == total` holds at every observation point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub mode: ProcessingMode,
    pub domains: Vec<String>,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub logs: Vec<LogEntry>,
    pub workers: HashMap<String, WorkerSnapshot>,
    pub results: HashMap<String, TaskReport>,
    pub metrics: JobMetrics,
}

impl Job {
    pub fn new(domains: Vec<String>, mode: ProcessingMode) -> Self {
        let total = domains.len() as u32;
        Self {
            id: Uuid::new_v4().to_string(),
            mode,
            domains,
            total,
            completed: 0,
            failed: 0,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            completed_at: None,
            logs: Vec::new(),
            workers: HashMap::new(),
            results: HashMap::new(),
            metrics: JobMetrics::default(),
        }
    }

    pub fn pending(&self) -> u32 {
        self.total - self.completed - self.failed
    }

    /// Moves `Queued -> Processing`. No-op in any later state, so it is safe
    /// to call both when enqueueing finishes and when the first result lands.
    pub fn mark_processing(&mut self) {
        if self.status == JobStatus::Queued {
            self.status = JobStatus::Processing;
            self.metrics.started_at.get_or_insert_with(Utc::now);
        }
    }

    /// Applies one domain's terminal result. Returns `DuplicateResult` if the
    /// domain already has a result (the counts are left untouched) and
    /// `UnknownTask` for a domain the job never contained.
    pub fn apply_result(&mut self, report: &TaskReport) -> Result<JobStatus, ScoutError> {
        if !self.domains.iter().any(|d| d == &report.domain) {
            return Err(ScoutError::UnknownTask {
                id: format!("{}:{}", self.id, report.domain),
            });
        }
        if self.results.contains_key(&report.domain) {
            return Err(ScoutError::DuplicateResult {
                job_id: self.id.clone(),
                domain: report.domain.clone(),
            });
        }

        self.mark_processing();

        match report.outcome {
            TaskOutcome::Success => self.completed += 1,
            TaskOutcome::Failure => self.failed += 1,
        }
        self.metrics
            .domain_timings_ms
            .insert(report.domain.clone(), report.duration_ms);
        self.results.insert(report.domain.clone(), report.clone());

        if self.completed + self.failed == self.total {
            self.status = if self.failed == 0 {
                JobStatus::Completed
            } else {
                JobStatus::CompletedWithFailures
            };
            let now = Utc::now();
            self.completed_at = Some(now);
            self.metrics.finished_at = Some(now);
        }

        Ok(self.status)
    }

    pub fn append_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
    }

    pub fn update_worker(&mut self, snapshot: WorkerSnapshot) {
        self.workers.insert(snapshot.worker_id.clone(), snapshot);
    }

    /// Read-only snapshot with the log tail bounded to `log_limit` entries.
    pub fn to_view(&self, log_limit: usize) -> JobView {
        let skip = self.logs.len().saturating_sub(log_limit);
        let mut workers: Vec<WorkerSnapshot> = self.workers.values().cloned().collect();
        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));

        let current_domain = workers
            .iter()
            .find(|w| w.state == WorkerState::Processing)
            .and_then(|w| w.current_domain.clone());

        JobView {
            job_id: self.id.clone(),
            mode: self.mode,
            status: self.status,
            total: self.total,
            completed: self.completed,
            failed: self.failed,
            pending: self.pending(),
            current_domain,
            logs: self.logs[skip..].to_vec(),
            workers,
            metrics: self.metrics.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

/// The one status payload shape shared by polling and push transports, and
/// by the parallel and sequential paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: String,
    pub mode: ProcessingMode,
    pub status: JobStatus,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub pending: u32,
    pub current_domain: Option<String>,
    pub logs: Vec<LogEntry>,
    pub workers: Vec<WorkerSnapshot>,
    pub metrics: JobMetrics,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Response to a batch submission: the job id plus the mode actually used,
/// which may differ from the hint after a downgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub job_id: String,
    pub mode: ProcessingMode,
    pub count: u32,
}

/// Capability probe consumed by the mode selector and operational tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthView {
    pub parallel_available: bool,
    pub pending_tasks: u32,
    pub mode: ProcessingMode,
}
