//! Retry utilities: backoff builders and retryable error classification.
//!
//! The engine itself never retries. Hosts wrap calls that may hit transient
//! backend failures:
//!
//! ```ignore
//! use backon::Retryable;
//!
//! let highest = (|| async { journal.read_highest_sequence_nr("order-1", 0).await })
//!     .retry(storage_backoff())
//!     .when(is_retryable)
//!     .await?;
//! ```

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::storage::StorageError;

/// Standard backoff for throttled or unavailable storage calls.
///
/// - Min delay: 50ms
/// - Max delay: 5s
/// - Max attempts: 8
/// - Jitter enabled
pub fn storage_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(8)
        .with_jitter()
}

/// Backoff for provisioning tables and containers at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn provisioning_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}

/// Determines if a storage error is worth retrying.
///
/// Only transient failures (unavailable, throttled, timed out) qualify.
/// Conflicts, missing records and decode failures fail the same way again.
pub fn is_retryable(error: &StorageError) -> bool {
    error.is_retryable()
}
