// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Payload can never become valid; the message is deleted without retry
    #[error("Malformed message: {0}")]
    Malformed(String),
}
