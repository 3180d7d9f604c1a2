use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use domainscout_domain::{
    Job, JobStatus, JobStore, JobView, LogEntry, ProcessingMode, ScoutError, ScoutResult,
    TaskReport, WorkerSnapshot,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// In-memory job record store. Each job sits behind its own mutex, so
/// mutations of one job serialize while different jobs mutate concurrently;
/// the outer map lock is only held long enough to find the entry.
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Arc<Mutex<Job>>>>,
    retention_seconds: u64,
    log_limit: usize,
}

impl MemoryJobStore {
    pub fn new(retention_seconds: u64, log_limit: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention_seconds,
            log_limit,
        }
    }

    async fn entry(&self, job_id: &str) -> ScoutResult<Arc<Mutex<Job>>> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| ScoutError::unknown_job(job_id))
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new(86_400, 200)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, domains: &[String], mode: ProcessingMode) -> ScoutResult<Job> {
        if domains.is_empty() {
            return Err(ScoutError::invalid_submission(
                "refusing to create a job with zero domains",
            ));
        }
        let job = Job::new(domains.to_vec(), mode);
        self.jobs
            .write()
            .await
            .insert(job.id.clone(), Arc::new(Mutex::new(job.clone())));
        debug!("created job {} with {} domains ({})", job.id, job.total, mode);
        Ok(job)
    }

    async fn mark_processing(&self, job_id: &str) -> ScoutResult<()> {
        let entry = self.entry(job_id).await?;
        entry.lock().await.mark_processing();
        Ok(())
    }

    async fn record_result(
        &self,
        job_id: &str,
        report: &TaskReport,
        logs: Vec<LogEntry>,
    ) -> ScoutResult<JobStatus> {
        let entry = self.entry(job_id).await?;
        let mut job = entry.lock().await;

        match job.apply_result(report) {
            Ok(status) => {
                for entry in logs {
                    job.append_log(entry);
                }
                Ok(status)
            }
            Err(ScoutError::DuplicateResult { job_id, domain }) => {
                warn!(
                    "duplicate result for {} in job {}, ignoring",
                    domain, job_id
                );
                job.append_log(LogEntry::warning(format!(
                    "duplicate result for {domain} ignored"
                )));
                Ok(job.status)
            }
            Err(e) => Err(e),
        }
    }

    async fn append_log(&self, job_id: &str, entry: LogEntry) -> ScoutResult<()> {
        let job = self.entry(job_id).await?;
        job.lock().await.append_log(entry);
        Ok(())
    }

    async fn update_worker(&self, job_id: &str, snapshot: WorkerSnapshot) -> ScoutResult<()> {
        let job = self.entry(job_id).await?;
        job.lock().await.update_worker(snapshot);
        Ok(())
    }

    async fn get_status(&self, job_id: &str) -> ScoutResult<JobView> {
        let entry = self.entry(job_id).await?;
        let job = entry.lock().await;
        Ok(job.to_view(self.log_limit))
    }

    async fn reap_expired(&self) -> ScoutResult<u32> {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.retention_seconds as i64);
        let mut expired = Vec::new();
        {
            let jobs = self.jobs.read().await;
            for (id, entry) in jobs.iter() {
                if entry.lock().await.created_at < cutoff {
                    expired.push(id.clone());
                }
            }
        }
        if expired.is_empty() {
            return Ok(0);
        }
        let mut jobs = self.jobs.write().await;
        let mut reaped = 0;
        for id in expired {
            if jobs.remove(&id).is_some() {
                debug!("reaped expired job {}", id);
                reaped += 1;
            }
        }
        Ok(reaped)
    }
}
