use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ScoutError {
    #[error("parallel backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("job not found: id={id}")]
    UnknownJob { id: String },
    #[error("task was never claimed by this queue: id={id}")]
    UnknownTask { id: String },
    #[error("task already acknowledged: id={id}")]
    AlreadyAcked { id: String },
    #[error("duplicate result for domain {domain} in job {job_id}")]
    DuplicateResult { job_id: String, domain: String },
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),
    #[error("pipeline timed out after {timeout_seconds}s for domain {domain}")]
    TaskTimeout { domain: String, timeout_seconds: u64 },
    #[error("pipeline failed for domain {domain}: {message}")]
    Pipeline { domain: String, message: String },
    #[error("queue operation failed: {0}")]
    Queue(String),
    #[error("job store operation failed: {0}")]
    Store(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ScoutResult<T> = Result<T, ScoutError>;

impl ScoutError {
    pub fn queue<S: Into<String>>(msg: S) -> Self {
        Self::Queue(msg.into())
    }

    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    pub fn unknown_job<S: Into<String>>(id: S) -> Self {
        Self::UnknownJob { id: id.into() }
    }

    pub fn invalid_submission<S: Into<String>>(msg: S) -> Self {
        Self::InvalidSubmission(msg.into())
    }

    /// Task-level failures are recorded against the task and never abort the
    /// job; only these variants should fail a submission outright.
    pub fn is_fatal_for_submission(&self) -> bool {
        matches!(
            self,
            ScoutError::Store(_) | ScoutError::Configuration(_) | ScoutError::Internal(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScoutError::Queue(_) | ScoutError::BackendUnavailable(_) | ScoutError::TaskTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for ScoutError {
    fn from(err: serde_json::Error) -> Self {
        ScoutError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ScoutError {
    fn from(err: anyhow::Error) -> Self {
        ScoutError::Internal(err.to_string())
    }
}
