//! FRMPayload encryption
//!
//! LoRaWAN encrypts FRMPayload with an AES keystream. Block `i` (1-based)
//! of the keystream is `AES(key, A_i)` where:
//!
//! ```text
//! ┌──────┬──────────┬─────┬──────────┬────────────┬──────┬─────┐
//! │ 0x01 │ 4 x 0x00 │ Dir │ DevAddr  │ FCnt (u32) │ 0x00 │  i  │
//! └──────┴──────────┴─────┴──────────┴────────────┴──────┴─────┘
//! ```
//!
//! The payload is XORed with the keystream; a trailing partial block uses
//! the matching prefix of its keystream block. XOR makes the operation an
//! involution, so [`crypt_frm_payload`] both encrypts and decrypts.
//!
//! The key is NwkSKey for FPort 0 and AppSKey otherwise; that choice belongs
//! to the frame layer.

use lib_types::{DevAddr, Direction, KEY_LENGTH};

use crate::symmetric::aes::{encrypt_block, BLOCK_SIZE};

/// Leading byte of every keystream counter block
const A_PREFIX: u8 = 0x01;

/// Counter block `A_i`
pub fn keystream_block(direction: Direction, dev_addr: DevAddr, fcnt: u32, index: u8) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = A_PREFIX;
    block[5] = direction.as_byte();
    block[6..10].copy_from_slice(&dev_addr.to_le_bytes());
    block[10..14].copy_from_slice(&fcnt.to_le_bytes());
    block[15] = index;
    block
}

/// Encrypt or decrypt a FRMPayload
pub fn crypt_frm_payload(
    key: &[u8; KEY_LENGTH],
    direction: Direction,
    dev_addr: DevAddr,
    fcnt: u32,
    payload: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    for (i, chunk) in payload.chunks(BLOCK_SIZE).enumerate() {
        // Payloads are at most 255 bytes, so the 1-based index fits in a u8
        let a_i = keystream_block(direction, dev_addr, fcnt, (i + 1) as u8);
        let s_i = encrypt_block(key, &a_i);
        out.extend(chunk.iter().zip(s_i.iter()).map(|(p, s)| p ^ s));
    }
    out
}
