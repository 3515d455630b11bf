use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound on concurrently executing computations across all actors
/// in the process
pub const DEFAULT_MAX_IN_FLIGHT: usize = 256;

/// Default time `post_and_reply` waits for a correlated result
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide tuning for a [`Troupe`](crate::Troupe)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroupeConfig {
    /// Capacity of the shared semaphore bounding in-flight computations
    pub max_in_flight: usize,

    /// Default timeout for `post_and_reply`
    pub reply_timeout: Duration,

    /// Whether a result entry is deleted once its waiter has read it.
    /// Leave `false` to retain results until an operator purges them.
    pub delete_result_on_read: bool,
}

impl Default for TroupeConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            delete_result_on_read: true,
        }
    }
}
