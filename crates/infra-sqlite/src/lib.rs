// Import Tagger Infrastructure - SQLite Adapter
// Implements: QueueTransport (durable queue with leases)

mod connection;
mod migration;
mod queue;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use queue::{QueueDepth, SqliteQueue};

use import_tagger_core::port::QueueError;

// Convert sqlx::Error into the queue port's error
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> QueueError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLITE_BUSY - another worker holds the write lock
            Some(code) if code.as_ref() == "5" => {
                QueueError::Transport(format!("Database locked (SQLITE_BUSY): {}", db_err.message()))
            }
            Some(code) => QueueError::Transport(format!(
                "Database error [{}]: {}",
                code.as_ref(),
                db_err.message()
            )),
            None => QueueError::Transport(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::RowNotFound => QueueError::NotFound("Row not found".to_string()),
        _ => QueueError::Transport(err.to_string()),
    }
}
