// Queue Transport Port (Interface)
// Durable at-least-once queue with leases (visibility timeouts)

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Proof of ownership of a dequeued message
///
/// Extending a lease may rotate the receipt; only the latest handle is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseHandle {
    pub message_id: String,
    pub pop_receipt: String,
}

/// A leased message as delivered by the transport
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub payload: Vec<u8>,
    /// Delivery count maintained by the transport (1 on first delivery)
    pub attempt_number: u32,
    pub lease: LeaseHandle,
}

/// Queue errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Lease expired or was taken over by another consumer
    #[error("Lease lost for message {message_id}")]
    LeaseLost { message_id: String },

    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Queue transport trait
///
/// Implementations:
/// - SqliteQueue: durable queue shared by worker processes
/// - InMemoryQueue: test double (see `mocks`)
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Lease up to `max_count` visible messages
    async fn dequeue(&self, max_count: usize) -> Result<Vec<QueueMessage>, QueueError>;

    /// Remove a leased message permanently
    ///
    /// # Errors
    /// - QueueError::LeaseLost if the handle no longer owns the message
    async fn delete(&self, lease: &LeaseHandle) -> Result<(), QueueError>;

    /// Keep a leased message hidden for `duration` from now
    ///
    /// Returns the handle that supersedes `lease`.
    async fn extend_lease(
        &self,
        lease: &LeaseHandle,
        duration: Duration,
    ) -> Result<LeaseHandle, QueueError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    #[derive(Debug, Clone)]
    struct StoredMessage {
        id: String,
        payload: Vec<u8>,
        dequeue_count: u32,
        pop_receipt: Option<String>,
        visibility: Option<Duration>,
    }

    #[derive(Default)]
    struct State {
        messages: Vec<StoredMessage>,
        deleted: Vec<String>,
        extensions: Vec<(String, Duration)>,
        receipt_seq: u64,
        next_id: u64,
    }

    /// In-memory queue
    ///
    /// Leased messages stay hidden until `expire_leases` is called, which stands
    /// in for the visibility timeout running out.
    #[derive(Default)]
    pub struct InMemoryQueue {
        state: Mutex<State>,
        fail_dequeue: Mutex<Option<String>>,
    }

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl InMemoryQueue {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn enqueue(&self, payload: impl Into<Vec<u8>>) -> String {
            let mut state = lock(&self.state);
            state.next_id += 1;
            let id = format!("msg-{}", state.next_id);
            state.messages.push(StoredMessage {
                id: id.clone(),
                payload: payload.into(),
                dequeue_count: 0,
                pop_receipt: None,
                visibility: None,
            });
            id
        }

        /// Enqueue a message that has already been delivered `count` times
        pub fn enqueue_with_dequeue_count(&self, payload: impl Into<Vec<u8>>, count: u32) -> String {
            let id = self.enqueue(payload);
            let mut state = lock(&self.state);
            if let Some(msg) = state.messages.iter_mut().find(|m| m.id == id) {
                msg.dequeue_count = count;
            }
            id
        }

        /// Make every leased message visible again
        pub fn expire_leases(&self) {
            let mut state = lock(&self.state);
            for msg in state.messages.iter_mut() {
                msg.pop_receipt = None;
                msg.visibility = None;
            }
        }

        /// Hand the lease on `message_id` to another consumer; outstanding handles stop working
        pub fn revoke_lease(&self, message_id: &str) {
            let mut state = lock(&self.state);
            if let Some(msg) = state.messages.iter_mut().find(|m| m.id == message_id) {
                msg.pop_receipt = Some("revoked".to_string());
            }
        }

        /// Make dequeue fail with a transport error until cleared
        pub fn fail_dequeue(&self, message: Option<&str>) {
            *lock(&self.fail_dequeue) = message.map(str::to_string);
        }

        pub fn len(&self) -> usize {
            lock(&self.state).messages.len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        pub fn deleted(&self) -> Vec<String> {
            lock(&self.state).deleted.clone()
        }

        pub fn extensions(&self) -> Vec<(String, Duration)> {
            lock(&self.state).extensions.clone()
        }

        /// Visibility most recently requested for a message, if leased
        pub fn visibility_of(&self, message_id: &str) -> Option<Duration> {
            lock(&self.state)
                .messages
                .iter()
                .find(|m| m.id == message_id)
                .and_then(|m| m.visibility)
        }
    }

    #[async_trait]
    impl QueueTransport for InMemoryQueue {
        async fn dequeue(&self, max_count: usize) -> Result<Vec<QueueMessage>, QueueError> {
            if let Some(msg) = lock(&self.fail_dequeue).clone() {
                return Err(QueueError::Transport(msg));
            }

            let mut state = lock(&self.state);
            let mut leased = Vec::new();
            let mut seq = state.receipt_seq;
            for msg in state.messages.iter_mut() {
                if leased.len() >= max_count {
                    break;
                }
                if msg.pop_receipt.is_some() {
                    continue;
                }
                seq += 1;
                let receipt = format!("receipt-{}", seq);
                msg.dequeue_count += 1;
                msg.pop_receipt = Some(receipt.clone());
                leased.push(QueueMessage {
                    payload: msg.payload.clone(),
                    attempt_number: msg.dequeue_count,
                    lease: LeaseHandle {
                        message_id: msg.id.clone(),
                        pop_receipt: receipt,
                    },
                });
            }
            state.receipt_seq = seq;
            Ok(leased)
        }

        async fn delete(&self, lease: &LeaseHandle) -> Result<(), QueueError> {
            let mut state = lock(&self.state);
            let position = state.messages.iter().position(|m| {
                m.id == lease.message_id && m.pop_receipt.as_deref() == Some(&lease.pop_receipt)
            });
            match position {
                Some(idx) => {
                    let msg = state.messages.remove(idx);
                    state.deleted.push(msg.id);
                    Ok(())
                }
                None => Err(QueueError::LeaseLost {
                    message_id: lease.message_id.clone(),
                }),
            }
        }

        async fn extend_lease(
            &self,
            lease: &LeaseHandle,
            duration: Duration,
        ) -> Result<LeaseHandle, QueueError> {
            let mut state = lock(&self.state);
            state.receipt_seq += 1;
            let receipt = format!("receipt-{}", state.receipt_seq);

            let msg = state
                .messages
                .iter_mut()
                .find(|m| {
                    m.id == lease.message_id
                        && m.pop_receipt.as_deref() == Some(&lease.pop_receipt)
                })
                .ok_or_else(|| QueueError::LeaseLost {
                    message_id: lease.message_id.clone(),
                })?;
            msg.pop_receipt = Some(receipt.clone());
            msg.visibility = Some(duration);

            state.extensions.push((lease.message_id.clone(), duration));
            Ok(LeaseHandle {
                message_id: lease.message_id.clone(),
                pop_receipt: receipt,
            })
        }
    }
}
