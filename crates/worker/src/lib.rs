pub mod pipeline;
pub mod runner;
pub mod sequential;
pub mod service;

pub use pipeline::CommandPipeline;
pub use runner::TaskRunner;
pub use sequential::SequentialRunner;
pub use service::{spawn_workers, WorkerService, WorkerServiceBuilder};
