// Processing Attempt

use std::time::Duration;
use tokio::time::Instant;

/// Deadline used when the processing budget does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// State held for one dequeue/processing cycle of a message
///
/// `attempt_number` comes from the transport's delivery count and is never
/// incremented here. The deadline is measured from the start of this attempt only.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingAttempt {
    pub attempt_number: u32,
    pub started_at: Instant,
    pub deadline: Instant,
}

impl ProcessingAttempt {
    pub fn start(attempt_number: u32, max_duration: Duration) -> Self {
        let started_at = Instant::now();
        let deadline = started_at
            .checked_add(max_duration.min(FAR_FUTURE))
            .unwrap_or(started_at);
        Self {
            attempt_number,
            started_at,
            deadline,
        }
    }

    /// Whether the retry budget still allows another delivery
    pub fn has_attempts_remaining(&self, max_attempts: u32) -> bool {
        self.attempt_number < max_attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
