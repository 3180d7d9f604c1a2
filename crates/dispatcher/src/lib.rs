pub mod facade;
pub mod mode;
pub mod normalize;
pub mod recovery;

pub use facade::{JobDispatcher, QueueStats};
pub use mode::ModeSelector;
pub use normalize::normalize_domains;
pub use recovery::RecoveryService;
