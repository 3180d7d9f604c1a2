pub mod entities;
pub mod errors;
pub mod ports;

pub use entities::{
    FailureKind, HealthView, Job, JobMetrics, JobStatus, JobView, LogEntry, LogLevel,
    ProcessingMode, Submission, TaskMessage, TaskOutcome, TaskReport, WorkerSnapshot, WorkerState,
};
pub use errors::{ScoutError, ScoutResult};
pub use ports::{DomainPipeline, JobStore, PipelineOutput, TaskQueue};
