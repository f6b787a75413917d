// Import Status Port (Interface)

use crate::domain::ImportStatus;
use async_trait::async_trait;
use thiserror::Error;

/// A status query that produced no answer
///
/// Distinct from `ImportStatus::Failed`, which is a semantic answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusQueryError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Status query timed out")]
    Timeout,
}

/// Remote import job status source
#[async_trait]
pub trait ImportStatusSource: Send + Sync {
    /// Query the current status of the job identified by `job_reference`
    async fn get_status(&self, job_reference: &str) -> Result<ImportStatus, StatusQueryError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// Replays a scripted sequence of answers; the last one repeats forever
    pub struct ScriptedStatusSource {
        script: Mutex<VecDeque<Result<ImportStatus, StatusQueryError>>>,
        last: Mutex<Result<ImportStatus, StatusQueryError>>,
        call_count: Mutex<usize>,
    }

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl ScriptedStatusSource {
        pub fn new(script: Vec<Result<ImportStatus, StatusQueryError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(Ok(ImportStatus::Pending)),
                call_count: Mutex::new(0),
            }
        }

        /// Always answers with `status`
        pub fn always(status: ImportStatus) -> Self {
            Self::new(vec![Ok(status)])
        }

        /// `pending` Pending answers followed by Complete
        pub fn complete_after(pending: usize) -> Self {
            let mut script: Vec<_> = (0..pending).map(|_| Ok(ImportStatus::Pending)).collect();
            script.push(Ok(ImportStatus::Complete));
            Self::new(script)
        }

        pub fn call_count(&self) -> usize {
            *lock(&self.call_count)
        }
    }

    #[async_trait]
    impl ImportStatusSource for ScriptedStatusSource {
        async fn get_status(&self, _job_reference: &str) -> Result<ImportStatus, StatusQueryError> {
            *lock(&self.call_count) += 1;

            let next = lock(&self.script).pop_front();
            match next {
                Some(answer) => {
                    *lock(&self.last) = answer.clone();
                    answer
                }
                None => lock(&self.last).clone(),
            }
        }
    }
}
