use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domainscout_dispatcher::{JobDispatcher, ModeSelector, RecoveryService};
use domainscout_domain::{
    DomainPipeline, JobStatus, JobStore, JobView, LogLevel, PipelineOutput, ProcessingMode,
    ScoutError, ScoutResult, TaskQueue,
};
use domainscout_infrastructure::{MemoryJobStore, MemoryTaskQueue};
use domainscout_worker::{spawn_workers, TaskRunner, WorkerService, WorkerServiceBuilder};
use tokio::sync::broadcast;

/// Pipeline stub with per-domain behavior: `slow-*` domains hang past any
/// reasonable timeout, `fail-*` domains report a pipeline error, everything
/// else succeeds quickly.
struct ScriptedPipeline;

#[async_trait]
impl DomainPipeline for ScriptedPipeline {
    async fn process(&self, domain: &str) -> ScoutResult<PipelineOutput> {
        if domain.starts_with("slow-") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if domain.starts_with("fail-") {
            return Err(ScoutError::Pipeline {
                domain: domain.to_string(),
                message: "no company profile found".to_string(),
            });
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(PipelineOutput {
            company_data: serde_json::json!({ "domain": domain, "name": "Acme" }),
        })
    }
}

struct Stack {
    store: Arc<MemoryJobStore>,
    dispatcher: JobDispatcher,
    shutdown: broadcast::Sender<()>,
}

async fn stack_with_workers(worker_count: usize, task_timeout: Duration) -> Stack {
    let queue = Arc::new(MemoryTaskQueue::default());
    let store = Arc::new(MemoryJobStore::default());
    let pipeline: Arc<dyn DomainPipeline> = Arc::new(ScriptedPipeline);

    let selector = Arc::new(
        ModeSelector::probe(
            Arc::clone(&queue) as Arc<dyn TaskQueue>,
            Duration::from_secs(1),
        )
        .await,
    );
    let dispatcher = JobDispatcher::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::clone(&queue) as Arc<dyn TaskQueue>,
        selector,
        Arc::clone(&pipeline),
        task_timeout,
    );

    let (shutdown, _) = broadcast::channel(16);
    let workers: Vec<WorkerService> = (0..worker_count)
        .map(|i| {
            let runner = TaskRunner::new(Arc::clone(&pipeline), task_timeout);
            WorkerServiceBuilder::new(
                Arc::clone(&queue) as Arc<dyn TaskQueue>,
                Arc::clone(&store) as Arc<dyn JobStore>,
                runner,
            )
            .worker_id(format!("worker-{i}"))
            .claim_timeout(Duration::from_millis(50))
            .build()
        })
        .collect();
    spawn_workers(workers, &shutdown);

    Stack {
        store,
        dispatcher,
        shutdown,
    }
}

async fn wait_terminal(store: &MemoryJobStore, job_id: &str) -> JobView {
    for _ in 0..400 {
        let view = store.get_status(job_id).await.unwrap();
        if view.status.is_terminal() {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

fn raw(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn parallel_job_with_one_timeout_completes_with_failures() {
    let stack = stack_with_workers(2, Duration::from_millis(200)).await;

    let submission = stack
        .dispatcher
        .submit(
            &raw(&["a.com", "slow-b.com", "c.com"]),
            Some(ProcessingMode::Parallel),
        )
        .await
        .unwrap();
    assert_eq!(submission.mode, ProcessingMode::Parallel);
    assert_eq!(submission.count, 3);

    let view = wait_terminal(&stack.store, &submission.job_id).await;
    assert_eq!(view.status, JobStatus::CompletedWithFailures);
    assert_eq!(view.completed, 2);
    assert_eq!(view.failed, 1);
    assert_eq!(view.pending, 0);
    assert!(view
        .logs
        .iter()
        .any(|l| l.level == LogLevel::Error && l.message.contains("slow-b.com")));
    assert_eq!(view.metrics.domain_timings_ms.len(), 3);
    assert!(view.metrics.finished_at.is_some());

    let _ = stack.shutdown.send(());
}

#[tokio::test]
async fn all_failures_never_complete_cleanly() {
    let stack = stack_with_workers(2, Duration::from_secs(5)).await;

    let submission = stack
        .dispatcher
        .submit(
            &raw(&["fail-a.com fail-b.com fail-c.com fail-d.com"]),
            Some(ProcessingMode::Parallel),
        )
        .await
        .unwrap();

    let view = wait_terminal(&stack.store, &submission.job_id).await;
    assert_eq!(view.status, JobStatus::CompletedWithFailures);
    assert_eq!(view.failed, 4);
    assert_eq!(view.completed, 0);

    let _ = stack.shutdown.send(());
}

#[tokio::test]
async fn sequential_and_parallel_views_share_one_shape() {
    let stack = stack_with_workers(2, Duration::from_secs(5)).await;

    let parallel = stack
        .dispatcher
        .submit(&raw(&["a.com", "fail-b.com"]), Some(ProcessingMode::Parallel))
        .await
        .unwrap();
    let sequential = stack
        .dispatcher
        .submit(
            &raw(&["a.com", "fail-b.com"]),
            Some(ProcessingMode::Sequential),
        )
        .await
        .unwrap();

    let p = wait_terminal(&stack.store, &parallel.job_id).await;
    let s = wait_terminal(&stack.store, &sequential.job_id).await;

    // same counters, same terminal state, same serialized field set
    assert_eq!(p.status, s.status);
    assert_eq!((p.total, p.completed, p.failed), (s.total, s.completed, s.failed));
    let p_json = serde_json::to_value(&p).unwrap();
    let s_json = serde_json::to_value(&s).unwrap();
    let keys = |v: &serde_json::Value| {
        let mut k: Vec<String> = v.as_object().unwrap().keys().cloned().collect();
        k.sort();
        k
    };
    assert_eq!(keys(&p_json), keys(&s_json));

    let _ = stack.shutdown.send(());
}

#[tokio::test]
async fn submission_cleanup_and_rejection() {
    let stack = stack_with_workers(1, Duration::from_secs(5)).await;

    let err = stack
        .dispatcher
        .submit(&raw(&["", "   ", ",, ,"]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ScoutError::InvalidSubmission(_)));

    // messy input still collapses into clean unique domains
    let submission = stack
        .dispatcher
        .submit(
            &raw(&["https://A.com/about, a.com", "b.com b.com"]),
            Some(ProcessingMode::Parallel),
        )
        .await
        .unwrap();
    assert_eq!(submission.count, 2);

    let view = wait_terminal(&stack.store, &submission.job_id).await;
    assert_eq!(view.status, JobStatus::Completed);

    let _ = stack.shutdown.send(());
}

#[tokio::test]
async fn recovery_requeues_work_from_a_dead_worker() {
    // short lease so an unacked claim expires quickly
    let queue = Arc::new(MemoryTaskQueue::new(Duration::from_millis(50)));
    let store = Arc::new(MemoryJobStore::default());

    let domains = raw(&["a.com"]);
    let job = store
        .create_job(&domains, ProcessingMode::Parallel)
        .await
        .unwrap();
    queue.enqueue(&job.id, &domains).await.unwrap();

    // simulate a crash: claim and never ack
    queue
        .claim("doomed", Duration::from_millis(100))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    let recovery = RecoveryService::new(
        Arc::clone(&queue) as Arc<dyn TaskQueue>,
        Arc::clone(&store) as Arc<dyn JobStore>,
        Duration::from_secs(30),
    );
    recovery.sweep().await;

    // a healthy worker picks the requeued task up and finishes the job
    let pipeline: Arc<dyn DomainPipeline> = Arc::new(ScriptedPipeline);
    let (shutdown, _) = broadcast::channel(1);
    let worker = WorkerServiceBuilder::new(
        Arc::clone(&queue) as Arc<dyn TaskQueue>,
        Arc::clone(&store) as Arc<dyn JobStore>,
        TaskRunner::new(pipeline, Duration::from_secs(5)),
    )
    .worker_id("healthy")
    .claim_timeout(Duration::from_millis(50))
    .build();
    spawn_workers(vec![worker], &shutdown);

    let view = wait_terminal(&store, &job.id).await;
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.completed, 1);

    let _ = shutdown.send(());
}
