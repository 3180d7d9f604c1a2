pub mod config;
pub mod factory;
pub mod memory_queue;
pub mod memory_store;
pub mod redis_queue;
pub mod redis_store;

pub use config::{
    ApiConfig, AppConfig, DispatcherConfig, QueueBackend, QueueConfig, StoreBackend, StoreConfig,
    WorkerConfig,
};
pub use factory::{JobStoreFactory, TaskQueueFactory};
pub use memory_queue::MemoryTaskQueue;
pub use memory_store::MemoryJobStore;
pub use redis_queue::RedisTaskQueue;
pub use redis_store::RedisJobStore;
