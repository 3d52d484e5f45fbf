//! Error types shared by the identifier and conversion helpers.

use thiserror::Error;

/// Failure converting between textual and binary representations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    /// Input is not valid hexadecimal
    #[error("invalid hex string: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Decoded byte count does not match the target type
    #[error("invalid length: expected {expected} bytes, found {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
