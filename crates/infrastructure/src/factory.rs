use std::sync::Arc;
use std::time::Duration;

use domainscout_domain::{JobStore, ScoutResult, TaskQueue};
use tracing::info;

use crate::config::{QueueBackend, QueueConfig, StoreBackend, StoreConfig};
use crate::memory_queue::MemoryTaskQueue;
use crate::memory_store::MemoryJobStore;
use crate::redis_queue::RedisTaskQueue;
use crate::redis_store::RedisJobStore;

/// Builds the configured [`TaskQueue`] backend. Redis construction failures
/// surface as `BackendUnavailable` so the caller can fall back to the
/// embedded queue instead of aborting.
pub struct TaskQueueFactory;

impl TaskQueueFactory {
    pub async fn create(config: &QueueConfig) -> ScoutResult<Arc<dyn TaskQueue>> {
        match config.backend {
            QueueBackend::Redis => {
                let queue = RedisTaskQueue::connect(
                    &config.url,
                    Duration::from_secs(config.lease_seconds),
                    Duration::from_secs(config.connect_timeout_seconds),
                )
                .await?;
                info!("task queue backend: redis");
                Ok(Arc::new(queue))
            }
            QueueBackend::InMemory => {
                info!("task queue backend: in-memory");
                Ok(Arc::new(MemoryTaskQueue::new(Duration::from_secs(
                    config.lease_seconds,
                ))))
            }
        }
    }
}

/// Builds the configured [`JobStore`] backend.
pub struct JobStoreFactory;

impl JobStoreFactory {
    pub async fn create(config: &StoreConfig) -> ScoutResult<Arc<dyn JobStore>> {
        match config.backend {
            StoreBackend::Redis => {
                let store = RedisJobStore::connect(
                    &config.url,
                    config.retention_seconds,
                    config.log_limit,
                    Duration::from_secs(5),
                )
                .await?;
                info!("job store backend: redis");
                Ok(Arc::new(store))
            }
            StoreBackend::Memory => {
                info!("job store backend: in-memory");
                Ok(Arc::new(MemoryJobStore::new(
                    config.retention_seconds,
                    config.log_limit,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_queue_backend_is_always_available() {
        let config = QueueConfig {
            backend: QueueBackend::InMemory,
            ..QueueConfig::default()
        };
        let queue = TaskQueueFactory::create(&config).await.unwrap();
        assert!(queue.ping().await);
    }

    #[tokio::test]
    async fn memory_store_backend_is_always_available() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        assert!(JobStoreFactory::create(&config).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_redis_queue_reports_backend_unavailable() {
        let config = QueueConfig {
            url: "redis://127.0.0.1:1/0".to_string(),
            connect_timeout_seconds: 1,
            ..QueueConfig::default()
        };
        assert!(matches!(
            TaskQueueFactory::create(&config).await,
            Err(domainscout_domain::ScoutError::BackendUnavailable(_))
        ));
    }
}
