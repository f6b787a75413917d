// Port Layer - Interfaces for external dependencies

pub mod entity_catalog;
pub mod import_status;
pub mod queue_transport;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use entity_catalog::{CatalogError, EntityCatalog, TagApplied};
pub use import_status::{ImportStatusSource, StatusQueryError};
pub use queue_transport::{LeaseHandle, QueueError, QueueMessage, QueueTransport};
pub use time_provider::TimeProvider;
