//! Cryptography error types

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// ECB operations need whole 16-byte blocks
    #[error("buffer length {0} is not a multiple of the AES block size")]
    InvalidBlockLength(usize),
}
