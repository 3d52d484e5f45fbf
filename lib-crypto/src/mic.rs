//! Message Integrity Codes
//!
//! Every LoRaWAN MIC is the first four bytes of an AES-CMAC tag:
//!
//! - Join-Request / Join-Accept: `cmac(AppKey, MHDR || body)`
//! - Data frames: `cmac(NwkSKey, B0 || MHDR || FHDR || FPort || FRMPayload)`
//!
//! The data-frame prefix block B0:
//!
//! ```text
//! ┌──────┬────────────┬─────┬──────────┬────────────┬──────┬─────────┐
//! │ 0x49 │ 4 x 0x00   │ Dir │ DevAddr  │ FCnt (u32) │ 0x00 │ len(msg)│
//! │ 1 B  │ 4 B        │ 1 B │ 4 B (LE) │ 4 B (LE)   │ 1 B  │ 1 B     │
//! └──────┴────────────┴─────┴──────────┴────────────┴──────┴─────────┘
//! ```
//!
//! FCnt is the full 32-bit counter. With 16-bit counters the caller passes
//! the wire value and the high bytes stay zero.

use aes::Aes128;
use cmac::{Cmac, Mac};
use lib_types::{AppKey, DevAddr, Direction, Mic, NwkSKey, KEY_LENGTH};

use crate::symmetric::aes::BLOCK_SIZE;

/// Leading byte of the B0 block
const B0_PREFIX: u8 = 0x49;

/// Full 16-byte AES-CMAC tag
pub fn aes_cmac(key: &[u8; KEY_LENGTH], data: &[u8]) -> [u8; BLOCK_SIZE] {
    let mut mac = <Cmac<Aes128> as Mac>::new(key.into());
    mac.update(data);
    let tag = mac.finalize().into_bytes();

    let mut out = [0u8; BLOCK_SIZE];
    out.copy_from_slice(&tag);
    out
}

fn truncate(tag: [u8; BLOCK_SIZE]) -> Mic {
    Mic([tag[0], tag[1], tag[2], tag[3]])
}

/// MIC for Join-Request and Join-Accept messages (`msg` excludes the MIC)
pub fn compute_join_mic(app_key: &AppKey, msg: &[u8]) -> Mic {
    truncate(aes_cmac(app_key.as_bytes(), msg))
}

/// Build the B0 block that prefixes a data frame before CMAC
pub fn data_mic_block(direction: Direction, dev_addr: DevAddr, fcnt: u32, msg_len: u8) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = B0_PREFIX;
    block[5] = direction.as_byte();
    block[6..10].copy_from_slice(&dev_addr.to_le_bytes());
    block[10..14].copy_from_slice(&fcnt.to_le_bytes());
    block[15] = msg_len;
    block
}

/// MIC for a data frame
///
/// `msg` is `MHDR || FHDR || FPort || FRMPayload` exactly as transmitted
/// (payload already encrypted). LoRaWAN frames never exceed 255 bytes, so
/// the length byte is the low byte of `msg.len()`.
pub fn compute_data_mic(
    nwk_s_key: &NwkSKey,
    direction: Direction,
    dev_addr: DevAddr,
    fcnt: u32,
    msg: &[u8],
) -> Mic {
    let b0 = data_mic_block(direction, dev_addr, fcnt, msg.len() as u8);

    let mut input = Vec::with_capacity(BLOCK_SIZE + msg.len());
    input.extend_from_slice(&b0);
    input.extend_from_slice(msg);
    truncate(aes_cmac(nwk_s_key.as_bytes(), &input))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(hex_str: &str) -> [u8; 16] {
        hex::decode(hex_str).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_rfc4493_vectors() {
        let k = key("2b7e151628aed2a6abf7158809cf4f3c");
        assert_eq!(hex::encode(aes_cmac(&k, &[])), "bb1d6929e95937287fa37d129b756746");

        let m = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
        assert_eq!(hex::encode(aes_cmac(&k, &m)), "070a16b46b4d4144f79bdd9dd04a287c");
    }

    #[test]
    fn test_b0_layout() {
        let b0 = data_mic_block(Direction::Downlink, DevAddr(0x0203_1980), 0x0001_1234, 9);
        assert_eq!(
            hex::encode_upper(b0),
            "49000000000180190302341201000009"
        );
    }

    #[test]
    fn test_join_request_mic_vector() {
        let app_key = AppKey::from_bytes(key("00112233445566778899AABBCCDDEEFF"));
        let msg = hex::decode("00010000D07ED5B37030051C000BA304000302").unwrap();
        assert_eq!(compute_join_mic(&app_key, &msg), Mic([182, 12, 228, 54]));
    }

    #[test]
    fn test_data_mic_vector() {
        let nwk = NwkSKey::from_bytes(key("263CBE4C30C062D18D992A0A4977C4C6"));
        let msg = hex::decode("4080190302800100012B5E36ACB9").unwrap();
        let mic = compute_data_mic(&nwk, Direction::Uplink, DevAddr(0x0203_1980), 1, &msg);
        assert_eq!(mic, Mic([52, 43, 131, 225]));
    }

    #[test]
    fn test_data_mic_depends_on_direction_and_counter_high_bits() {
        let nwk = NwkSKey::from_bytes([7u8; 16]);
        let msg = [0x40u8, 1, 2, 3, 4, 0, 1, 0];
        let addr = DevAddr(0x0102_0304);
        let up = compute_data_mic(&nwk, Direction::Uplink, addr, 1, &msg);
        let down = compute_data_mic(&nwk, Direction::Downlink, addr, 1, &msg);
        let rolled = compute_data_mic(&nwk, Direction::Uplink, addr, 0x1_0001, &msg);
        assert_ne!(up, down);
        assert_ne!(up, rolled);
        assert_eq!(up, compute_data_mic(&nwk, Direction::Uplink, addr, 1, &msg));
    }
}
