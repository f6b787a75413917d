// Application Layer - Message lifecycle use cases

pub mod decoder;
pub mod lifecycle;
pub mod poller;
pub mod requeue;
pub mod resolver;
pub mod tag_applicator;
pub mod worker;

// Re-exports
pub use decoder::decode;
pub use lifecycle::{EngineConfig, LifecycleEngine, Phase};
pub use poller::StatusPoller;
pub use requeue::RequeuePolicy;
pub use resolver::EntityResolver;
pub use tag_applicator::TagApplicator;
pub use worker::{shutdown_channel, QueueDriver, ShutdownSender, ShutdownToken, WorkerConfig};
