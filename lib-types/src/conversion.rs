//! Hex and byte-array conversion helpers.
//!
//! Typed identifiers and keys in [`crate::identifiers`] and [`crate::keys`]
//! parse through these helpers; frame and payload bytes are logged with
//! [`bytes_to_hex`].
//!
//! Parsing accepts the common separator styles found in provisioning data:
//! `570BC7`, `57-0B-C7`, `57:0B:C7` and `57 0B C7` all decode to the same
//! three bytes.

use crate::errors::ConversionError;

/// Render bytes as upper-case hex without separators.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Decode a hex string, ignoring `-`, `:` and whitespace separators.
pub fn hex_to_bytes(input: &str) -> Result<Vec<u8>, ConversionError> {
    let cleaned: String = input
        .chars()
        .filter(|c| !matches!(c, '-' | ':') && !c.is_whitespace())
        .collect();
    Ok(hex::decode(cleaned)?)
}

/// Decode a hex string into a fixed-size array.
pub fn hex_to_array<const N: usize>(input: &str) -> Result<[u8; N], ConversionError> {
    let bytes = hex_to_bytes(input)?;
    slice_to_array(&bytes)
}

/// Copy a slice into a fixed-size array, checking the length.
pub fn slice_to_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], ConversionError> {
    bytes.try_into().map_err(|_| ConversionError::InvalidLength {
        expected: N,
        actual: bytes.len(),
    })
}
