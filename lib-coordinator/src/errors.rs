//! Coordinator error types

use lib_network::EncodeError;
use lib_storage::CacheError;
use thiserror::Error;

/// Errors surfaced by the coordination pipeline.
///
/// Frames that fail to decode or authenticate are not errors; they end in
/// `DownlinkDecision::Drop`. What remains here is infrastructure failure.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Shared cache failure; retryable when the backend was unreachable
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A cached value did not parse
    #[error("Malformed cache value under '{key}': {reason}")]
    CorruptCacheValue { key: String, reason: String },

    /// The device registry could not answer
    #[error("Device registry failure: {0:#}")]
    Registry(anyhow::Error),

    /// An outgoing frame could not be built
    #[error("Failed to encode downlink: {0}")]
    Encode(#[from] EncodeError),
}

impl CoordinatorError {
    /// Whether the transport layer may replay the uplink
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoordinatorError::Cache(e) if e.is_retryable())
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
