// Queue Driver - Message fetch/dispatch loop

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::decoder::decode;
use crate::application::lifecycle::{report, LifecycleEngine};
use crate::application::requeue::RequeuePolicy;
use crate::domain::{Disposition, Outcome, Verdict};
use crate::error::Result;
use crate::port::{LeaseHandle, QueueError, QueueMessage, QueueTransport};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Driver loop settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerConfig {
    /// Sleep between queue fetches
    pub poll_interval: Duration,
    /// Lease duration granted on every extension
    pub visibility_timeout: Duration,
    /// Messages leased per fetch
    pub batch_size: usize,
    pub requeue: RequeuePolicy,
}

impl WorkerConfig {
    /// Leases are renewed at half the visibility timeout, well before they lapse
    pub fn renewal_interval(&self) -> Duration {
        (self.visibility_timeout / 2).max(MIN_LEASE_RENEWAL_INTERVAL)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_QUEUE_POLL_INTERVAL,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
            requeue: RequeuePolicy::LeaseExpiry,
        }
    }
}

/// QueueDriver leases messages and runs each through the lifecycle engine
pub struct QueueDriver {
    transport: Arc<dyn QueueTransport>,
    engine: Arc<LifecycleEngine>,
    config: WorkerConfig,
}

impl QueueDriver {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        engine: Arc<LifecycleEngine>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            transport,
            engine,
            config,
        }
    }

    /// Run driver loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            visibility_timeout_ms = self.config.visibility_timeout.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Queue driver started"
        );
        loop {
            if shutdown.is_shutdown() {
                info!("Queue driver shutting down");
                break;
            }
            let pause = match self.process_next_batch().await {
                Ok(_) => self.config.poll_interval,
                Err(e) => {
                    error!(error = %e, "Failed to fetch messages");
                    ERROR_RECOVERY_SLEEP_DURATION
                }
            };
            tokio::select! {
                _ = sleep(pause) => {},
                _ = shutdown.wait() => {
                    info!("Queue driver interrupted while idle");
                    break;
                }
            }
        }
        info!("Queue driver stopped");
        Ok(())
    }

    /// Fetch one batch and process every message in it (returns messages processed)
    pub async fn process_next_batch(&self) -> Result<usize> {
        let messages = self.transport.dequeue(self.config.batch_size).await?;
        if messages.is_empty() {
            debug!("Queue empty");
            return Ok(0);
        }

        let count = messages.len();
        let mut waiting: VecDeque<QueueMessage> = messages.into();
        while let Some(message) = waiting.pop_front() {
            self.run_message(message, &mut waiting).await;
        }
        Ok(count)
    }

    /// Run one leased message to its final disposition and apply it
    ///
    /// The lease is renewed in the background while the engine works. A panic
    /// inside the engine is contained here and treated as a retryable failure.
    pub async fn process_message(&self, message: QueueMessage) -> Outcome {
        self.run_message(message, &mut VecDeque::new()).await
    }

    /// Process `message` while also keeping the leases of `waiting` batch-mates alive
    async fn run_message(
        &self,
        message: QueueMessage,
        waiting: &mut VecDeque<QueueMessage>,
    ) -> Outcome {
        let QueueMessage {
            payload,
            attempt_number,
            lease,
        } = message;
        let message_id = lease.message_id.clone();
        info!(message_id = %message_id, attempt = attempt_number, "Processing message");

        let engine = Arc::clone(&self.engine);
        let payload = Arc::new(payload);
        let engine_payload = Arc::clone(&payload);
        let mut handle =
            tokio::spawn(async move { engine.process(&engine_payload, attempt_number).await });

        let period = self.config.renewal_interval();
        let mut renewal = interval_at(Instant::now() + period, period);
        renewal.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut lease = lease;
        let mut renewing = true;

        let joined = loop {
            tokio::select! {
                joined = &mut handle => break joined,
                _ = renewal.tick(), if renewing || !waiting.is_empty() => {
                    if renewing {
                        match self.apply_disposition(Disposition::ExtendLease, &lease, attempt_number).await {
                            Ok(renewed) => {
                                debug!(message_id = %message_id, "Renewed lease");
                                lease = renewed;
                            }
                            Err(e) => {
                                error!(message_id = %message_id, error = %e, "Error renewing lease, renewal stopped");
                                renewing = false;
                            }
                        }
                    }
                    self.renew_waiting(waiting).await;
                }
            }
        };

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(join_err) => {
                let cause = if join_err.is_panic() {
                    format!("processing panicked: {}", join_err)
                } else {
                    format!("processing cancelled: {}", join_err)
                };
                let max_attempts = self.engine.config().max_attempts;
                let outcome = Outcome::decide(Verdict::Crashed(cause), attempt_number, max_attempts);
                let request = decode(&payload).ok();
                report(request.as_ref(), &outcome, max_attempts);
                outcome
            }
        };

        match self
            .apply_disposition(outcome.disposition, &lease, attempt_number)
            .await
        {
            Ok(_) => info!(
                message_id = %message_id,
                disposition = %outcome.disposition,
                reason = outcome.verdict.label(),
                "Message finalized"
            ),
            Err(QueueError::LeaseLost { .. }) => warn!(
                message_id = %message_id,
                disposition = %outcome.disposition,
                "Lease lost before disposition was applied, message will be redelivered"
            ),
            Err(e) => error!(
                message_id = %message_id,
                disposition = %outcome.disposition,
                error = %e,
                "Failed to apply disposition"
            ),
        }

        outcome
    }

    /// Extend every waiting lease; a message whose lease is gone is dropped from the batch
    async fn renew_waiting(&self, waiting: &mut VecDeque<QueueMessage>) {
        let mut kept = VecDeque::with_capacity(waiting.len());
        while let Some(mut message) = waiting.pop_front() {
            match self
                .transport
                .extend_lease(&message.lease, self.config.visibility_timeout)
                .await
            {
                Ok(renewed) => {
                    message.lease = renewed;
                    kept.push_back(message);
                }
                Err(e) => warn!(
                    message_id = %message.lease.message_id,
                    error = %e,
                    "Lost lease on waiting message, leaving it for redelivery"
                ),
            }
        }
        *waiting = kept;
    }

    /// Carry out a disposition against the transport, returning the current lease
    async fn apply_disposition(
        &self,
        disposition: Disposition,
        lease: &LeaseHandle,
        attempt_number: u32,
    ) -> std::result::Result<LeaseHandle, QueueError> {
        match disposition {
            Disposition::Delete => {
                self.transport.delete(lease).await?;
                Ok(lease.clone())
            }
            Disposition::Requeue => match self.config.requeue.delay_for(attempt_number) {
                Some(delay) => self.transport.extend_lease(lease, delay).await,
                None => Ok(lease.clone()),
            },
            Disposition::ExtendLease => {
                self.transport
                    .extend_lease(lease, self.config.visibility_timeout)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::lifecycle::EngineConfig;
    use crate::domain::{EntityRef, ImportStatus};
    use crate::port::entity_catalog::mocks::MockEntityCatalog;
    use crate::port::import_status::mocks::ScriptedStatusSource;
    use crate::port::queue_transport::mocks::InMemoryQueue;
    use serde_json::json;

    const PAYLOAD: &str = r#"{"target_name":"svc-a","branch":"main","tags":[{"key":"team","value":"payments"}],"org_id":"org1","import_job_url":"https://api.example.com/imports/job1"}"#;

    fn driver(
        queue: Arc<InMemoryQueue>,
        status: ScriptedStatusSource,
        requeue: RequeuePolicy,
    ) -> QueueDriver {
        batch_driver(queue, status, requeue, 1)
    }

    fn batch_driver(
        queue: Arc<InMemoryQueue>,
        status: ScriptedStatusSource,
        requeue: RequeuePolicy,
        batch_size: usize,
    ) -> QueueDriver {
        let catalog = Arc::new(MockEntityCatalog::new(vec![EntityRef::new(
            "e1",
            "svc-a(main):package.json",
            "main",
        )]));
        let engine = Arc::new(LifecycleEngine::new(
            Arc::new(status),
            catalog,
            EngineConfig {
                max_processing: Duration::from_secs(120),
                max_attempts: 3,
                status_poll_interval: Duration::from_secs(10),
            },
        ));
        QueueDriver::new(
            queue,
            engine,
            WorkerConfig {
                poll_interval: Duration::from_secs(5),
                visibility_timeout: Duration::from_secs(30),
                batch_size,
                requeue,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_message_is_deleted() {
        let queue = Arc::new(InMemoryQueue::new());
        let id = queue.enqueue(PAYLOAD);
        let driver = driver(
            queue.clone(),
            ScriptedStatusSource::always(ImportStatus::Complete),
            RequeuePolicy::LeaseExpiry,
        );

        assert_eq!(driver.process_next_batch().await.unwrap(), 1);
        assert_eq!(queue.deleted(), vec![id]);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_renewed_while_polling() {
        let queue = Arc::new(InMemoryQueue::new());
        let id = queue.enqueue(PAYLOAD);
        let driver = driver(
            queue.clone(),
            ScriptedStatusSource::complete_after(5),
            RequeuePolicy::LeaseExpiry,
        );

        driver.process_next_batch().await.unwrap();

        // Complete at t=50s: renewals at 15s, 30s, 45s
        let extensions = queue.extensions();
        assert_eq!(extensions.len(), 3);
        assert!(extensions
            .iter()
            .all(|(msg, d)| msg == &id && *d == Duration::from_secs(30)));
        // Delete succeeded with the rotated receipt
        assert_eq!(queue.deleted(), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_leaves_message_for_redelivery() {
        let queue = Arc::new(InMemoryQueue::new());
        let id = queue.enqueue(PAYLOAD);
        let driver = driver(
            queue.clone(),
            ScriptedStatusSource::always(ImportStatus::Pending),
            RequeuePolicy::LeaseExpiry,
        );

        driver.process_next_batch().await.unwrap();
        assert!(queue.deleted().is_empty());
        assert_eq!(queue.len(), 1);

        // Still leased until the visibility timeout runs out
        assert_eq!(driver.process_next_batch().await.unwrap(), 0);
        queue.expire_leases();

        // Attempts 2 and 3 (the last) - the last one gives up
        driver.process_next_batch().await.unwrap();
        queue.expire_leases();
        driver.process_next_batch().await.unwrap();
        assert_eq!(queue.deleted(), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_backoff_sets_visibility() {
        let queue = Arc::new(InMemoryQueue::new());
        let id = queue.enqueue(PAYLOAD);
        let driver = driver(
            queue.clone(),
            ScriptedStatusSource::always(ImportStatus::Pending),
            RequeuePolicy::Backoff {
                max_processing: Duration::from_secs(400),
                max_attempts: 3,
            },
        );

        driver.process_next_batch().await.unwrap();

        // Attempt 1 of 3: 400s * 0.5^2
        assert_eq!(queue.visibility_of(&id), Some(Duration::from_secs(100)));
        assert!(queue.deleted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_message_deleted_on_first_delivery() {
        let queue = Arc::new(InMemoryQueue::new());
        let id = queue.enqueue(json!({"target_name": "svc-a"}).to_string());
        let driver = driver(
            queue.clone(),
            ScriptedStatusSource::always(ImportStatus::Complete),
            RequeuePolicy::LeaseExpiry,
        );

        driver.process_next_batch().await.unwrap();
        assert_eq!(queue.deleted(), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_renewal_stops_renewing_but_processing_finishes() {
        let queue = Arc::new(InMemoryQueue::new());
        let first = queue.enqueue(PAYLOAD);
        let driver = Arc::new(driver(
            queue.clone(),
            ScriptedStatusSource::complete_after(5),
            RequeuePolicy::LeaseExpiry,
        ));

        let message = queue.dequeue(1).await.unwrap().remove(0);
        let runner = Arc::clone(&driver);
        let handle = tokio::spawn(async move { runner.process_message(message).await });

        // First renewal at 15s succeeds, then another consumer takes the message
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(queue.extensions().len(), 1);
        queue.revoke_lease(&first);

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.disposition, Disposition::Delete);
        assert!(matches!(outcome.verdict, Verdict::Tagged(_)));

        // Renewal at 30s failed and none were attempted after it; the delete was refused
        assert_eq!(queue.extensions().len(), 1);
        assert!(queue.deleted().is_empty());

        // The driver carries on with the next message
        let second = queue.enqueue(PAYLOAD);
        assert_eq!(driver.process_next_batch().await.unwrap(), 1);
        assert_eq!(queue.deleted(), vec![second]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_batch_leases_are_renewed() {
        let queue = Arc::new(InMemoryQueue::new());
        let first = queue.enqueue(PAYLOAD);
        let second = queue.enqueue(PAYLOAD);
        let driver = batch_driver(
            queue.clone(),
            ScriptedStatusSource::complete_after(5),
            RequeuePolicy::LeaseExpiry,
            2,
        );

        assert_eq!(driver.process_next_batch().await.unwrap(), 2);

        // While the first message polled for 50s, the second was renewed alongside it
        let renewed_second = queue
            .extensions()
            .iter()
            .filter(|(id, _)| id == &second)
            .count();
        assert_eq!(renewed_second, 3);
        // Both deletes used the rotated receipts
        assert_eq!(queue.deleted(), vec![first, second]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_message_with_lost_lease_is_skipped() {
        let queue = Arc::new(InMemoryQueue::new());
        let first = queue.enqueue(PAYLOAD);
        let second = queue.enqueue(PAYLOAD);
        let driver = batch_driver(
            queue.clone(),
            ScriptedStatusSource::complete_after(5),
            RequeuePolicy::LeaseExpiry,
            2,
        );
        let messages = queue.dequeue(2).await.unwrap();
        queue.revoke_lease(&second);

        let mut waiting: VecDeque<QueueMessage> = messages.into();
        let head = waiting.pop_front().unwrap();
        driver.run_message(head, &mut waiting).await;

        assert!(waiting.is_empty());
        assert_eq!(queue.deleted(), vec![first]);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown_and_survives_fetch_errors() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.fail_dequeue(Some("queue unavailable"));
        let driver = Arc::new(driver(
            queue.clone(),
            ScriptedStatusSource::always(ImportStatus::Complete),
            RequeuePolicy::LeaseExpiry,
        ));

        let (tx, token) = shutdown_channel();
        let runner = Arc::clone(&driver);
        let handle = tokio::spawn(async move { runner.run(token).await });

        tokio::time::sleep(Duration::from_secs(3)).await;
        queue.fail_dequeue(None);
        let id = queue.enqueue(PAYLOAD);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(queue.deleted(), vec![id]);

        tx.shutdown();
        tokio_test::assert_ok!(handle.await.unwrap());
    }
}
