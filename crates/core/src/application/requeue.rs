// Requeue policy
use std::time::Duration;
use tracing::info;

/// How a `Requeue` disposition is carried out
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequeuePolicy {
    /// Leave the lease to run out; the message reappears after the visibility timeout
    LeaseExpiry,
    /// Hide the message for a delay that doubles with every attempt
    ///
    /// delay = max_processing * 0.5 ^ (max_attempts - attempt_number)
    Backoff {
        max_processing: Duration,
        max_attempts: u32,
    },
}

impl RequeuePolicy {
    /// Visibility delay to set on requeue, or None to leave the lease alone
    ///
    /// # Example
    /// ```text
    /// // 30 minute budget, 5 attempts: 1.875m, 3.75m, 7.5m, 15m
    /// let policy = RequeuePolicy::Backoff { max_processing: 30m, max_attempts: 5 };
    /// policy.delay_for(4) == Some(15m)
    /// ```
    pub fn delay_for(&self, attempt_number: u32) -> Option<Duration> {
        match *self {
            RequeuePolicy::LeaseExpiry => None,
            RequeuePolicy::Backoff {
                max_processing,
                max_attempts,
            } => {
                let exponent = max_attempts.saturating_sub(attempt_number).min(i32::MAX as u32);
                let factor = 0.5_f64.powi(exponent as i32);
                let delay = max_processing.mul_f64(factor).max(Duration::from_secs(1));

                info!(
                    attempt = attempt_number,
                    max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    "Requeue backoff computed"
                );
                Some(delay)
            }
        }
    }
}
