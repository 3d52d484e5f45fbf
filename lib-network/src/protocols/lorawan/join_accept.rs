//! Join-Accept (downlink, encrypted with AppKey)
//!
//! Plaintext layout:
//!
//! ```text
//! ┌──────┬──────────┬───────┬─────────┬────────────┬─────────┬────────────┬─────┐
//! │ MHDR │ AppNonce │ NetID │ DevAddr │ DLSettings │ RxDelay │ CFList     │ MIC │
//! │ 1 B  │ 3 B      │ 3 B   │ 4 B     │ 1 B        │ 1 B     │ 0 or 16 B  │ 4 B │
//! └──────┴──────────┴───────┴─────────┴────────────┴─────────┴────────────┴─────┘
//! ```
//!
//! Everything after MHDR, MIC included, is encrypted as whole AES blocks, so
//! the frame is either 17 or 33 bytes long. The MIC is computed over the
//! plaintext. A received frame is held as [`EncryptedJoinAccept`] until the
//! caller supplies the AppKey.

use lib_crypto::{compute_join_mic, decrypt_join_accept, encrypt_join_accept};
use lib_types::{AppKey, AppNonce, DevAddr, Mic, NetId};

use super::errors::{DecodeError, EncodeError};
use super::mhdr::{MType, Mhdr};

/// Encoded length without CFList
pub const JOIN_ACCEPT_LENGTH: usize = 17;
/// Encoded length with CFList
pub const JOIN_ACCEPT_CFLIST_LENGTH: usize = 33;
/// Optional channel frequency list
pub const CFLIST_LENGTH: usize = 16;

/// Plaintext Join-Accept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAccept {
    pub mhdr: Mhdr,
    pub app_nonce: AppNonce,
    pub net_id: NetId,
    pub dev_addr: DevAddr,
    pub dl_settings: u8,
    pub rx_delay: u8,
    pub cf_list: Option<[u8; CFLIST_LENGTH]>,
    pub mic: Mic,
}

impl JoinAccept {
    /// Build a Join-Accept and compute its MIC
    pub fn new(
        app_nonce: AppNonce,
        net_id: NetId,
        dev_addr: DevAddr,
        dl_settings: u8,
        rx_delay: u8,
        cf_list: Option<[u8; CFLIST_LENGTH]>,
        app_key: &AppKey,
    ) -> Self {
        let mut accept = Self {
            mhdr: Mhdr::new(MType::JoinAccept),
            app_nonce,
            net_id,
            dev_addr,
            dl_settings,
            rx_delay,
            cf_list,
            mic: Mic::default(),
        };
        accept.mic = accept.compute_mic(app_key);
        accept
    }

    /// RX1 data-rate offset (DLSettings bits 6..4)
    pub fn rx1_dr_offset(&self) -> u8 {
        (self.dl_settings >> 4) & 0x07
    }

    /// RX2 data rate (DLSettings bits 3..0)
    pub fn rx2_data_rate(&self) -> u8 {
        self.dl_settings & 0x0f
    }

    /// `MHDR || AppNonce || NetID || DevAddr || DLSettings || RxDelay || CFList`
    fn signed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(JOIN_ACCEPT_CFLIST_LENGTH);
        out.push(self.mhdr.as_byte());
        out.extend_from_slice(&self.app_nonce.to_le_bytes());
        out.extend_from_slice(&self.net_id.to_le_bytes());
        out.extend_from_slice(&self.dev_addr.to_le_bytes());
        out.push(self.dl_settings);
        out.push(self.rx_delay);
        if let Some(cf_list) = &self.cf_list {
            out.extend_from_slice(cf_list);
        }
        out
    }

    pub fn compute_mic(&self, app_key: &AppKey) -> Mic {
        compute_join_mic(app_key, &self.signed_bytes())
    }

    pub fn verify_mic(&self, app_key: &AppKey) -> bool {
        self.compute_mic(app_key) == self.mic
    }

    /// Encrypt for transmission
    pub fn encrypt(&self, app_key: &AppKey) -> Result<EncryptedJoinAccept, EncodeError> {
        let mut body = self.signed_bytes().split_off(1);
        body.extend_from_slice(self.mic.as_bytes());
        encrypt_join_accept(app_key, &mut body)?;

        Ok(EncryptedJoinAccept {
            mhdr: self.mhdr,
            ciphertext: body,
        })
    }

    fn parse_plaintext(mhdr: Mhdr, plaintext: &[u8]) -> Self {
        let mut dev_addr = [0u8; 4];
        dev_addr.copy_from_slice(&plaintext[6..10]);

        let cf_list = if plaintext.len() == JOIN_ACCEPT_CFLIST_LENGTH - 1 {
            let mut cf_list = [0u8; CFLIST_LENGTH];
            cf_list.copy_from_slice(&plaintext[12..28]);
            Some(cf_list)
        } else {
            None
        };

        let mic_start = plaintext.len() - Mic::LENGTH;
        let mut mic = [0u8; Mic::LENGTH];
        mic.copy_from_slice(&plaintext[mic_start..]);

        Self {
            mhdr,
            app_nonce: AppNonce::from_le_bytes([plaintext[0], plaintext[1], plaintext[2]]),
            net_id: NetId::from_le_bytes([plaintext[3], plaintext[4], plaintext[5]]),
            dev_addr: DevAddr::from_le_bytes(dev_addr),
            dl_settings: plaintext[10],
            rx_delay: plaintext[11],
            cf_list,
            mic: Mic(mic),
        }
    }
}

/// Join-Accept as seen on air
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedJoinAccept {
    pub mhdr: Mhdr,
    ciphertext: Vec<u8>,
}

impl EncryptedJoinAccept {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != JOIN_ACCEPT_LENGTH && bytes.len() != JOIN_ACCEPT_CFLIST_LENGTH {
            return Err(DecodeError::InvalidLength {
                frame: "join-accept",
                expected: "17 or 33",
                actual: bytes.len(),
            });
        }

        let mhdr = Mhdr::from_byte(bytes[0]);
        if mhdr.mtype()? != MType::JoinAccept {
            return Err(DecodeError::UnexpectedFrameType {
                expected: "join-accept",
                found: mhdr.mtype_bits(),
            });
        }

        Ok(Self {
            mhdr,
            ciphertext: bytes[1..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.ciphertext.len());
        out.push(self.mhdr.as_byte());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn has_cf_list(&self) -> bool {
        self.ciphertext.len() == JOIN_ACCEPT_CFLIST_LENGTH - 1
    }

    /// Recover the plaintext fields. The MIC is not checked here; call
    /// [`JoinAccept::verify_mic`] on the result.
    pub fn decrypt(&self, app_key: &AppKey) -> Result<JoinAccept, DecodeError> {
        let mut plaintext = self.ciphertext.clone();
        decrypt_join_accept(app_key, &mut plaintext).map_err(|_| DecodeError::InvalidLength {
            frame: "join-accept",
            expected: "17 or 33",
            actual: 1 + self.ciphertext.len(),
        })?;
        Ok(JoinAccept::parse_plaintext(self.mhdr, &plaintext))
    }
}
