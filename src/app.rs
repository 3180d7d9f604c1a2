use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use domainscout_api::create_app;
use domainscout_dispatcher::{JobDispatcher, ModeSelector, RecoveryService};
use domainscout_domain::{DomainPipeline, JobStore, ScoutError, TaskQueue};
use domainscout_infrastructure::{
    AppConfig, JobStoreFactory, MemoryJobStore, MemoryTaskQueue, TaskQueueFactory,
};
use domainscout_worker::{
    spawn_workers, CommandPipeline, TaskRunner, WorkerService, WorkerServiceBuilder,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Api,
    Worker,
    All,
}

/// Wires the configured backends into the dispatcher, workers and HTTP
/// server, then runs the subsystems the selected mode asks for.
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn JobStore>,
    dispatcher: Arc<JobDispatcher>,
    pipeline: Arc<dyn DomainPipeline>,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        // a dead queue backend downgrades to sequential mode instead of
        // failing startup
        let (queue, selector) = match TaskQueueFactory::create(&config.queue).await {
            Ok(queue) => {
                let selector = ModeSelector::probe(
                    Arc::clone(&queue),
                    Duration::from_secs(config.queue.connect_timeout_seconds),
                )
                .await;
                (queue, selector)
            }
            Err(ScoutError::BackendUnavailable(reason)) => {
                warn!("queue backend unavailable at startup: {}", reason);
                let queue: Arc<dyn TaskQueue> = Arc::new(MemoryTaskQueue::new(
                    Duration::from_secs(config.queue.lease_seconds),
                ));
                let selector = ModeSelector::degraded(Arc::clone(&queue));
                (queue, selector)
            }
            Err(e) => return Err(e).context("queue backend construction failed"),
        };

        let store = match JobStoreFactory::create(&config.store).await {
            Ok(store) => store,
            Err(ScoutError::BackendUnavailable(reason)) => {
                warn!(
                    "store backend unavailable at startup: {}, using in-memory store",
                    reason
                );
                Arc::new(MemoryJobStore::new(
                    config.store.retention_seconds,
                    config.store.log_limit,
                )) as Arc<dyn JobStore>
            }
            Err(e) => return Err(e).context("store backend construction failed"),
        };

        let pipeline: Arc<dyn DomainPipeline> = Arc::new(CommandPipeline::new(
            config.worker.pipeline_command.clone(),
            config.worker.pipeline_args.clone(),
        ));

        let dispatcher = Arc::new(JobDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::new(selector),
            Arc::clone(&pipeline),
            Duration::from_secs(config.worker.task_timeout_seconds),
        ));

        Ok(Self {
            config,
            mode,
            queue,
            store,
            dispatcher,
            pipeline,
        })
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("starting application in {:?} mode", self.mode);

        // worker loops subscribe through an internal sender fed from the
        // outer shutdown signal
        let (fanout_tx, _) = broadcast::channel(16);
        let mut handles = Vec::new();

        if matches!(self.mode, AppMode::Worker | AppMode::All) {
            handles.extend(spawn_workers(self.build_workers(), &fanout_tx));

            let recovery = RecoveryService::new(
                Arc::clone(&self.queue),
                Arc::clone(&self.store),
                Duration::from_secs(self.config.dispatcher.recovery_interval_seconds),
            );
            let rx = fanout_tx.subscribe();
            handles.push(tokio::spawn(async move { recovery.run(rx).await }));
        }

        if matches!(self.mode, AppMode::Api | AppMode::All) {
            let app = create_app(Arc::clone(&self.dispatcher));
            let bind = self.config.api.bind_address.clone();
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            info!("api listening on {}", bind);

            let mut rx = fanout_tx.subscribe();
            handles.push(tokio::spawn(async move {
                let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = rx.recv().await;
                });
                if let Err(e) = server.await {
                    error!("api server failed: {}", e);
                }
            }));
        }

        let _ = shutdown_rx.recv().await;
        info!("application received shutdown signal");
        let _ = fanout_tx.send(());

        for handle in handles {
            let _ = handle.await;
        }
        info!("application stopped");
        Ok(())
    }

    fn build_workers(&self) -> Vec<WorkerService> {
        (0..self.config.worker.count)
            .map(|index| {
                let runner = TaskRunner::new(
                    Arc::clone(&self.pipeline),
                    Duration::from_secs(self.config.worker.task_timeout_seconds),
                );
                let builder = WorkerServiceBuilder::new(
                    Arc::clone(&self.queue),
                    Arc::clone(&self.store),
                    runner,
                )
                .claim_timeout(Duration::from_secs(self.config.worker.claim_timeout_seconds));
                match &self.config.worker.worker_id {
                    Some(prefix) => builder.worker_id(format!("{prefix}-{index}")).build(),
                    None => builder.build(),
                }
            })
            .collect()
    }
}
