// Worker constants (No magic values)
use std::time::Duration;

/// Max wall-clock processing per attempt (30 minutes)
pub const DEFAULT_MAX_PROCESSING: Duration = Duration::from_secs(30 * 60);

/// Deliveries before a retryable failure is abandoned
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Interval between job status queries (10s)
pub const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Sleep between queue fetches (10s)
pub const DEFAULT_QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Lease (visibility timeout) duration (30s)
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Messages leased per fetch
/// Messages in a batch are processed one after another, so larger batches
/// hold leases on messages that are not being renewed yet.
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Sleep duration after a failed fetch before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Lower bound on the lease renewal period
pub const MIN_LEASE_RENEWAL_INTERVAL: Duration = Duration::from_millis(500);
