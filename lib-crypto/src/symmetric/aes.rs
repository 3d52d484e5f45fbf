//! AES-128 block primitives
//!
//! LoRaWAN only ever needs single-block AES in ECB mode: keystream blocks,
//! key derivation and the Join-Accept cipher are all built from it. There is
//! no IV and no padding anywhere; callers hand in whole blocks.
//!
//! # Join-Accept direction quirk
//!
//! The network server "encrypts" a Join-Accept with AES *decrypt* so that
//! end devices only have to carry the encrypt primitive. Consequently
//! [`encrypt_join_accept`] runs the decrypt routine and
//! [`decrypt_join_accept`] runs the encrypt routine.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use lib_types::{AppKey, KEY_LENGTH};

use crate::errors::CryptoError;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Encrypt a single 16-byte block
pub fn encrypt_block(key: &[u8; KEY_LENGTH], block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let cipher = Aes128::new(key.into());
    let mut output = *block;
    cipher.encrypt_block((&mut output).into());
    output
}

/// AES-128-ECB encrypt whole blocks in place
pub fn ecb_encrypt_in_place(key: &[u8; KEY_LENGTH], data: &mut [u8]) -> Result<(), CryptoError> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidBlockLength(data.len()));
    }

    let cipher = Aes128::new(key.into());
    for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
        cipher.encrypt_block(chunk.into());
    }
    Ok(())
}

/// AES-128-ECB decrypt whole blocks in place
pub fn ecb_decrypt_in_place(key: &[u8; KEY_LENGTH], data: &mut [u8]) -> Result<(), CryptoError> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidBlockLength(data.len()));
    }

    let cipher = Aes128::new(key.into());
    for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
        cipher.decrypt_block(chunk.into());
    }
    Ok(())
}

/// Encrypt `body || MIC` of a Join-Accept (everything after MHDR)
pub fn encrypt_join_accept(app_key: &AppKey, body_and_mic: &mut [u8]) -> Result<(), CryptoError> {
    ecb_decrypt_in_place(app_key.as_bytes(), body_and_mic)
}

/// Recover `body || MIC` of a received Join-Accept
pub fn decrypt_join_accept(app_key: &AppKey, ciphertext: &mut [u8]) -> Result<(), CryptoError> {
    ecb_encrypt_in_place(app_key.as_bytes(), ciphertext)
}
