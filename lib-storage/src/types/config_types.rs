//! Cache configuration
//!
//! ```toml
//! [cache]
//! lock_wait_timeout = "30s"
//! lock_poll_interval = "100ms"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lock acquisition tuning shared by every cache backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Upper bound on a blocking lock take before it fails with
    /// `CacheError::LockTimeout`. Default: 30 seconds.
    #[serde(with = "humantime_serde", default = "default_lock_wait_timeout")]
    pub lock_wait_timeout: Duration,

    /// Delay between attempts while blocking on a held lock.
    /// Default: 100 milliseconds.
    #[serde(with = "humantime_serde", default = "default_lock_poll_interval")]
    pub lock_poll_interval: Duration,
}

fn default_lock_wait_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_lock_poll_interval() -> Duration {
    Duration::from_millis(100)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lock_wait_timeout: default_lock_wait_timeout(),
            lock_poll_interval: default_lock_poll_interval(),
        }
    }
}
