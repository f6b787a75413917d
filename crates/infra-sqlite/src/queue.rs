// SQLite QueueTransport Implementation

use async_trait::async_trait;
use import_tagger_core::port::{LeaseHandle, QueueError, QueueMessage, QueueTransport, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::map_sqlx_error;

/// Visible vs. leased message counts for one queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueDepth {
    pub visible: i64,
    pub leased: i64,
}

/// Durable queue stored in a SQLite table
///
/// Leasing works like a visibility timeout: a dequeued message is hidden until
/// `visible_at`, and every lease carries a pop receipt that changes whenever the
/// message is dequeued again or its lease is extended.
pub struct SqliteQueue {
    pool: SqlitePool,
    queue: String,
    visibility_timeout: Duration,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteQueue {
    pub fn new(
        pool: SqlitePool,
        queue: impl Into<String>,
        visibility_timeout: Duration,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            pool,
            queue: queue.into(),
            visibility_timeout,
            time_provider,
        }
    }

    /// Add a message, immediately visible
    pub async fn enqueue(&self, payload: &[u8]) -> Result<String, QueueError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = self.time_provider.now_millis();

        sqlx::query(
            r#"
            INSERT INTO queue_messages (id, queue, payload, enqueued_at, visible_at, dequeue_count)
            VALUES (?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&id)
        .bind(&self.queue)
        .bind(payload)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(message_id = %id, queue = %self.queue, "Message enqueued");
        Ok(id)
    }

    pub async fn depth(&self) -> Result<QueueDepth, QueueError> {
        let now = self.time_provider.now_millis();
        let (visible, leased): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN visible_at <= ? THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN visible_at > ? THEN 1 ELSE 0 END), 0)
            FROM queue_messages
            WHERE queue = ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(&self.queue)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(QueueDepth { visible, leased })
    }

    fn millis(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

#[async_trait]
impl QueueTransport for SqliteQueue {
    async fn dequeue(&self, max_count: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let now = self.time_provider.now_millis();
        let visible_at = now.saturating_add(Self::millis(self.visibility_timeout));
        let receipt_prefix = uuid::Uuid::new_v4().to_string();
        let limit = i64::try_from(max_count).unwrap_or(i64::MAX);

        // Single statement: concurrent workers can never lease the same message
        let mut rows = sqlx::query_as::<_, LeasedRow>(
            r#"
            UPDATE queue_messages
            SET dequeue_count = dequeue_count + 1,
                visible_at = ?,
                pop_receipt = ? || ':' || id
            WHERE id IN (
                SELECT id FROM queue_messages
                WHERE queue = ? AND visible_at <= ?
                ORDER BY enqueued_at ASC, id ASC
                LIMIT ?
            )
            RETURNING id, payload, dequeue_count, pop_receipt, enqueued_at
            "#,
        )
        .bind(visible_at)
        .bind(&receipt_prefix)
        .bind(&self.queue)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.sort_by(|a, b| (a.enqueued_at, &a.id).cmp(&(b.enqueued_at, &b.id)));

        Ok(rows
            .into_iter()
            .map(|row| QueueMessage {
                payload: row.payload,
                attempt_number: u32::try_from(row.dequeue_count).unwrap_or(u32::MAX),
                lease: LeaseHandle {
                    message_id: row.id,
                    pop_receipt: row.pop_receipt,
                },
            })
            .collect())
    }

    async fn delete(&self, lease: &LeaseHandle) -> Result<(), QueueError> {
        let result = sqlx::query("DELETE FROM queue_messages WHERE id = ? AND pop_receipt = ?")
            .bind(&lease.message_id)
            .bind(&lease.pop_receipt)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::LeaseLost {
                message_id: lease.message_id.clone(),
            });
        }
        debug!(message_id = %lease.message_id, "Message deleted");
        Ok(())
    }

    async fn extend_lease(
        &self,
        lease: &LeaseHandle,
        duration: Duration,
    ) -> Result<LeaseHandle, QueueError> {
        let now = self.time_provider.now_millis();
        let receipt = format!("{}:{}", uuid::Uuid::new_v4(), lease.message_id);

        let result = sqlx::query(
            r#"
            UPDATE queue_messages
            SET visible_at = ?, pop_receipt = ?
            WHERE id = ? AND pop_receipt = ?
            "#,
        )
        .bind(now.saturating_add(Self::millis(duration)))
        .bind(&receipt)
        .bind(&lease.message_id)
        .bind(&lease.pop_receipt)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::LeaseLost {
                message_id: lease.message_id.clone(),
            });
        }

        Ok(LeaseHandle {
            message_id: lease.message_id.clone(),
            pop_receipt: receipt,
        })
    }
}

/// Row returned by a lease
#[derive(Debug, sqlx::FromRow)]
struct LeasedRow {
    id: String,
    payload: Vec<u8>,
    dequeue_count: i64,
    pop_receipt: String,
    enqueued_at: i64,
}
