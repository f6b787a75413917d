// Import Tagger Infrastructure - HTTP Adapter
// Implements: ImportStatusSource, EntityCatalog (project REST + v1 tagging APIs)

mod client;
mod projects;
mod status;

pub use client::{ApiConfig, ProjectApiClient};
