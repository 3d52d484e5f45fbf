//! Cache error types

use std::time::Duration;

use thiserror::Error;

/// Cache operation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The backing store could not be reached or rejected the command.
    /// Retryable: the caller decides whether to replay the whole request.
    #[error("Cache backend failure: {0}")]
    Backend(String),

    /// A blocking lock acquisition ran out of time
    #[error("Timed out after {waited:?} waiting for lock '{key}'")]
    LockTimeout { key: String, waited: Duration },

    /// Key holds a value of another kind (string vs list)
    #[error("Key '{0}' holds the wrong kind of value")]
    WrongType(String),

    /// A cached value could not be encoded or parsed
    #[error("Cache value serialization failed: {0}")]
    Serialization(String),
}

impl CacheError {
    /// Whether replaying the request might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::Backend(_))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
