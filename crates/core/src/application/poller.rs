// Import Status Poller
// Fixed-interval polling bounded by the attempt deadline

use crate::domain::ImportStatus;
use crate::port::{ImportStatusSource, StatusQueryError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, warn};

/// Polls an import job until it is terminal or the deadline passes
pub struct StatusPoller {
    source: Arc<dyn ImportStatusSource>,
    interval: Duration,
}

impl StatusPoller {
    /// Create a new poller
    ///
    /// # Arguments
    /// * `source` - Job status capability
    /// * `interval` - Fixed sleep between queries (no backoff)
    pub fn new(source: Arc<dyn ImportStatusSource>, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Query immediately, then every `interval` until `Complete`/`Failed` or `deadline`
    ///
    /// Returns `Pending` when the deadline passes without a terminal status. Query
    /// failures are observed as `Unknown` and polled through like `Pending`.
    pub async fn await_completion(&self, job_reference: &str, deadline: Instant) -> ImportStatus {
        let mut polls: u32 = 0;
        loop {
            polls += 1;
            let observed = self.query(job_reference, deadline).await;

            if observed.is_terminal() {
                debug!(job = %job_reference, polls, status = %observed, "Import job is terminal");
                return observed;
            }
            match &observed {
                ImportStatus::Unknown(raw) => {
                    warn!(job = %job_reference, polls, raw = %raw, "Import status unknown, will poll again");
                }
                _ => debug!(job = %job_reference, polls, "Import job still pending"),
            }

            match Instant::now().checked_add(self.interval) {
                Some(next) if next < deadline => sleep_until(next).await,
                _ => {
                    sleep_until(deadline).await;
                    debug!(job = %job_reference, polls, "Poll deadline reached without terminal status");
                    return ImportStatus::Pending;
                }
            }
        }
    }

    async fn query(&self, job_reference: &str, deadline: Instant) -> ImportStatus {
        match timeout_at(deadline, self.source.get_status(job_reference)).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => ImportStatus::Unknown(e.to_string()),
            Err(_) => ImportStatus::Unknown(StatusQueryError::Timeout.to_string()),
        }
    }
}
