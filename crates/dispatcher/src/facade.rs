use std::sync::Arc;
use std::time::Duration;

use domainscout_domain::{
    DomainPipeline, HealthView, JobStore, JobView, LogEntry, ProcessingMode, ScoutError,
    ScoutResult, Submission, TaskQueue,
};
use domainscout_worker::{SequentialRunner, TaskRunner};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::mode::ModeSelector;
use crate::normalize::normalize_domains;

/// Queue and worker statistics for operational tooling.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending_tasks: u32,
    pub connected: bool,
}

/// Single entry point for submissions and status reads. Owns the
/// parallel-vs-sequential decision so callers only ever see a job id and a
/// uniform status payload.
pub struct JobDispatcher {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    selector: Arc<ModeSelector>,
    pipeline: Arc<dyn DomainPipeline>,
    task_timeout: Duration,
}

impl JobDispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        selector: Arc<ModeSelector>,
        pipeline: Arc<dyn DomainPipeline>,
        task_timeout: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            selector,
            pipeline,
            task_timeout,
        }
    }

    /// Accepts a raw submission, picks the processing mode and starts the
    /// job. The returned mode is the one actually used, which may be a
    /// downgrade from the caller's hint.
    pub async fn submit(
        &self,
        raw: &[String],
        hint: Option<ProcessingMode>,
    ) -> ScoutResult<Submission> {
        let domains = normalize_domains(raw);
        if domains.is_empty() {
            return Err(ScoutError::invalid_submission(
                "no valid domains in submission",
            ));
        }

        let mode = match hint {
            Some(ProcessingMode::Parallel) if !self.selector.parallel_available() => {
                return Err(ScoutError::BackendUnavailable(
                    "parallel processing requested but the queue backend is down".to_string(),
                ));
            }
            Some(mode) => mode,
            None => self.selector.current(),
        };

        match mode {
            ProcessingMode::Parallel => self.submit_parallel(domains).await,
            ProcessingMode::Sequential => self.submit_sequential(domains).await,
        }
    }

    async fn submit_parallel(&self, domains: Vec<String>) -> ScoutResult<Submission> {
        let job = self
            .store
            .create_job(&domains, ProcessingMode::Parallel)
            .await?;

        if let Err(e) = self.queue.enqueue(&job.id, &domains).await {
            // the backend died between the probe and now; the job still runs,
            // just not in parallel
            warn!("enqueue for job {} failed: {}, going sequential", job.id, e);
            self.selector.downgrade();
            self.store
                .append_log(
                    &job.id,
                    LogEntry::warning(
                        "queue backend unavailable, processing sequentially".to_string(),
                    ),
                )
                .await?;
            self.spawn_sequential(job.id.clone(), domains.clone());
            return Ok(Submission {
                job_id: job.id,
                mode: ProcessingMode::Sequential,
                count: domains.len() as u32,
            });
        }

        self.store.mark_processing(&job.id).await?;
        self.store
            .append_log(
                &job.id,
                LogEntry::info(format!(
                    "Queued {} domains for parallel processing",
                    domains.len()
                )),
            )
            .await?;
        info!("job {} queued with {} domains", job.id, domains.len());

        Ok(Submission {
            job_id: job.id,
            mode: ProcessingMode::Parallel,
            count: domains.len() as u32,
        })
    }

    async fn submit_sequential(&self, domains: Vec<String>) -> ScoutResult<Submission> {
        let job = self
            .store
            .create_job(&domains, ProcessingMode::Sequential)
            .await?;
        info!(
            "job {} starting sequentially with {} domains",
            job.id,
            domains.len()
        );
        self.spawn_sequential(job.id.clone(), domains.clone());

        Ok(Submission {
            job_id: job.id,
            mode: ProcessingMode::Sequential,
            count: domains.len() as u32,
        })
    }

    fn spawn_sequential(&self, job_id: String, domains: Vec<String>) {
        let runner = SequentialRunner::new(
            Arc::clone(&self.store),
            TaskRunner::new(Arc::clone(&self.pipeline), self.task_timeout),
        );
        tokio::spawn(async move {
            if let Err(e) = runner.run(&job_id, &domains).await {
                error!("sequential run for job {} failed: {}", job_id, e);
            }
        });
    }

    pub async fn status(&self, job_id: &str) -> ScoutResult<JobView> {
        self.store.get_status(job_id).await
    }

    pub async fn health(&self) -> HealthView {
        let pending_tasks = self.queue.pending_tasks().await.unwrap_or(0);
        HealthView {
            parallel_available: self.selector.parallel_available(),
            pending_tasks,
            mode: self.selector.current(),
        }
    }

    /// Live queue statistics; `BackendUnavailable` while downgraded.
    pub async fn worker_stats(&self) -> ScoutResult<QueueStats> {
        if !self.selector.parallel_available() {
            return Err(ScoutError::BackendUnavailable(
                "queue backend is not available".to_string(),
            ));
        }
        Ok(QueueStats {
            pending_tasks: self.queue.pending_tasks().await?,
            connected: self.queue.ping().await,
        })
    }

    pub async fn reprobe(&self) -> bool {
        self.selector.reprobe().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domainscout_domain::{JobStatus, PipelineOutput, TaskOutcome};
    use domainscout_infrastructure::{MemoryJobStore, MemoryTaskQueue};

    struct OkPipeline;

    #[async_trait]
    impl DomainPipeline for OkPipeline {
        async fn process(&self, _domain: &str) -> ScoutResult<PipelineOutput> {
            Ok(PipelineOutput {
                company_data: serde_json::json!({}),
            })
        }
    }

    struct DownQueue;

    #[async_trait]
    impl domainscout_domain::TaskQueue for DownQueue {
        async fn enqueue(&self, _job_id: &str, _domains: &[String]) -> ScoutResult<()> {
            Err(ScoutError::BackendUnavailable("connection refused".into()))
        }
        async fn claim(
            &self,
            _worker_id: &str,
            _timeout: Duration,
        ) -> ScoutResult<Option<domainscout_domain::TaskMessage>> {
            Ok(None)
        }
        async fn ack(&self, _task_id: &str, _outcome: TaskOutcome) -> ScoutResult<()> {
            Ok(())
        }
        async fn requeue_expired(&self) -> ScoutResult<u32> {
            Ok(0)
        }
        async fn pending_tasks(&self) -> ScoutResult<u32> {
            Err(ScoutError::BackendUnavailable("connection refused".into()))
        }
        async fn ping(&self) -> bool {
            false
        }
    }

    fn raw(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    async fn dispatcher_over(
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn JobStore>,
    ) -> JobDispatcher {
        let selector = Arc::new(ModeSelector::probe(Arc::clone(&queue), Duration::from_secs(1)).await);
        JobDispatcher::new(
            store,
            queue,
            selector,
            Arc::new(OkPipeline),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn parallel_submission_lands_on_the_queue() {
        let queue = Arc::new(MemoryTaskQueue::default());
        let store = Arc::new(MemoryJobStore::default());
        let dispatcher = dispatcher_over(Arc::clone(&queue) as _, Arc::clone(&store) as _).await;

        let submission = dispatcher
            .submit(&raw(&["a.com, b.com"]), Some(ProcessingMode::Parallel))
            .await
            .unwrap();
        assert_eq!(submission.mode, ProcessingMode::Parallel);
        assert_eq!(submission.count, 2);
        assert_eq!(queue.pending_tasks().await.unwrap(), 2);

        let view = dispatcher.status(&submission.job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Processing);
        assert_eq!(view.total, 2);
    }

    #[tokio::test]
    async fn empty_submission_is_rejected_without_a_job() {
        let queue = Arc::new(MemoryTaskQueue::default());
        let store = Arc::new(MemoryJobStore::default());
        let dispatcher = dispatcher_over(queue as _, store as _).await;

        let err = dispatcher
            .submit(&raw(&["  ", ",,"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ScoutError::InvalidSubmission(_)));
    }

    #[tokio::test]
    async fn explicit_parallel_against_a_dead_backend_is_refused() {
        let store = Arc::new(MemoryJobStore::default());
        let dispatcher = dispatcher_over(Arc::new(DownQueue) as _, store as _).await;

        let err = dispatcher
            .submit(&raw(&["a.com"]), Some(ProcessingMode::Parallel))
            .await
            .unwrap_err();
        assert!(matches!(err, ScoutError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn no_hint_on_a_dead_backend_runs_sequentially() {
        let store = Arc::new(MemoryJobStore::default());
        let dispatcher =
            dispatcher_over(Arc::new(DownQueue) as _, Arc::clone(&store) as _).await;

        let submission = dispatcher.submit(&raw(&["a.com"]), None).await.unwrap();
        assert_eq!(submission.mode, ProcessingMode::Sequential);

        // the spawned sequential run completes the job on its own
        for _ in 0..100 {
            let view = store.get_status(&submission.job_id).await.unwrap();
            if view.status.is_terminal() {
                assert_eq!(view.status, JobStatus::Completed);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sequential job never finished");
    }

    #[tokio::test]
    async fn enqueue_failure_downgrades_and_falls_back() {
        let store = Arc::new(MemoryJobStore::default());
        // probe sees a live queue, enqueue then fails
        struct LyingQueue;
        #[async_trait]
        impl domainscout_domain::TaskQueue for LyingQueue {
            async fn enqueue(&self, _job_id: &str, _domains: &[String]) -> ScoutResult<()> {
                Err(ScoutError::queue("broken pipe"))
            }
            async fn claim(
                &self,
                _worker_id: &str,
                _timeout: Duration,
            ) -> ScoutResult<Option<domainscout_domain::TaskMessage>> {
                Ok(None)
            }
            async fn ack(&self, _task_id: &str, _outcome: TaskOutcome) -> ScoutResult<()> {
                Ok(())
            }
            async fn requeue_expired(&self) -> ScoutResult<u32> {
                Ok(0)
            }
            async fn pending_tasks(&self) -> ScoutResult<u32> {
                Ok(0)
            }
            async fn ping(&self) -> bool {
                true
            }
        }

        let dispatcher =
            dispatcher_over(Arc::new(LyingQueue) as _, Arc::clone(&store) as _).await;
        let submission = dispatcher
            .submit(&raw(&["a.com"]), Some(ProcessingMode::Parallel))
            .await
            .unwrap();
        assert_eq!(submission.mode, ProcessingMode::Sequential);
        assert_eq!(dispatcher.health().await.mode, ProcessingMode::Sequential);

        let view = store.get_status(&submission.job_id).await.unwrap();
        assert!(view
            .logs
            .iter()
            .any(|l| l.message.contains("processing sequentially")));
    }

    #[tokio::test]
    async fn health_reports_backend_and_mode() {
        let queue = Arc::new(MemoryTaskQueue::default());
        let store = Arc::new(MemoryJobStore::default());
        let dispatcher = dispatcher_over(Arc::clone(&queue) as _, store as _).await;

        let health = dispatcher.health().await;
        assert!(health.parallel_available);
        assert_eq!(health.mode, ProcessingMode::Parallel);

        let stats = dispatcher.worker_stats().await.unwrap();
        assert!(stats.connected);
        assert_eq!(stats.pending_tasks, 0);
    }
}
