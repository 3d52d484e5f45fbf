//! LoRaWAN 1.0.x session-key derivation
//!
//! ```text
//! NwkSKey = aes128_encrypt(AppKey, 0x01 | AppNonce | NetID | DevNonce | pad16)
//! AppSKey = aes128_encrypt(AppKey, 0x02 | AppNonce | NetID | DevNonce | pad16)
//! ```
//!
//! All fields are in wire (little-endian) order; the block is exactly one
//! AES block so there is no IV and no padding scheme beyond the zero fill.

use lib_types::{AppKey, AppNonce, AppSKey, DevNonce, NetId, NwkSKey, SessionKeys};

use crate::symmetric::aes::{encrypt_block, BLOCK_SIZE};

/// Which session key to derive; the value is the leading block byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionKeyType {
    Network = 0x01,
    Application = 0x02,
}

fn derivation_block(
    key_type: SessionKeyType,
    app_nonce: AppNonce,
    net_id: NetId,
    dev_nonce: DevNonce,
) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = key_type as u8;
    block[1..4].copy_from_slice(&app_nonce.to_le_bytes());
    block[4..7].copy_from_slice(&net_id.to_le_bytes());
    block[7..9].copy_from_slice(&dev_nonce.to_le_bytes());
    block
}

/// Derive one raw session key
pub fn derive_session_key(
    key_type: SessionKeyType,
    app_nonce: AppNonce,
    net_id: NetId,
    dev_nonce: DevNonce,
    app_key: &AppKey,
) -> [u8; BLOCK_SIZE] {
    let block = derivation_block(key_type, app_nonce, net_id, dev_nonce);
    encrypt_block(app_key.as_bytes(), &block)
}

/// Derive both session keys for a completed join
pub fn derive_session_keys(
    app_nonce: AppNonce,
    net_id: NetId,
    dev_nonce: DevNonce,
    app_key: &AppKey,
) -> SessionKeys {
    SessionKeys {
        nwk_s_key: NwkSKey::from_bytes(derive_session_key(
            SessionKeyType::Network,
            app_nonce,
            net_id,
            dev_nonce,
            app_key,
        )),
        app_s_key: AppSKey::from_bytes(derive_session_key(
            SessionKeyType::Application,
            app_nonce,
            net_id,
            dev_nonce,
            app_key,
        )),
    }
}
