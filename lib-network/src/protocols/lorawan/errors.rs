//! Codec error types
//!
//! Decode errors describe malformed input from the air and are non-fatal:
//! the frame is dropped and no state changes. Encode errors describe frames
//! a caller assembled incorrectly.

use lib_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,

    #[error("unknown frame type {0:#05b}")]
    UnknownFrameType(u8),

    #[error("{frame} must be {expected} bytes, found {actual}")]
    InvalidLength {
        frame: &'static str,
        expected: &'static str,
        actual: usize,
    },

    #[error("frame too short: need at least {min} bytes, found {actual}")]
    TooShort { min: usize, actual: usize },

    #[error("FOptsLen {declared} exceeds the {available} bytes available")]
    InvalidFOptsLength { declared: usize, available: usize },

    #[error("MAC commands present in both FOpts and an FPort 0 payload")]
    InvalidMacCommandFrame,

    #[error("expected a {expected} frame, found message type {found:#05b}")]
    UnexpectedFrameType { expected: &'static str, found: u8 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("FPort 0 carries MAC commands only and cannot hold application data or coexist with FOpts")]
    InvalidMacCommandFrame,

    #[error("FOpts holds at most 15 bytes, got {0}")]
    FOptsTooLong(usize),

    #[error("encoded frame of {0} bytes exceeds the LoRaWAN PHYPayload limit")]
    FrameTooLong(usize),

    #[error("frame variant does not match MHDR message type {0:#05b}")]
    MessageTypeMismatch(u8),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
