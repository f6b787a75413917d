// Domain Layer - Pure business types

pub mod attempt;
pub mod disposition;
pub mod entity;
pub mod error;
pub mod request;
pub mod status;

// Re-exports
pub use attempt::ProcessingAttempt;
pub use disposition::{Disposition, Outcome, Verdict};
pub use entity::{EntityRef, TagFailure, TagOutcome, TagReport};
pub use error::DomainError;
pub use request::{ImportTagRequest, Tag};
pub use status::ImportStatus;
