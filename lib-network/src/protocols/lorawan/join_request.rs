//! Join-Request (uplink, plaintext)
//!
//! ```text
//! ┌──────┬─────────┬────────┬──────────┬─────┐
//! │ MHDR │ JoinEUI │ DevEUI │ DevNonce │ MIC │
//! │ 1 B  │ 8 B     │ 8 B    │ 2 B      │ 4 B │
//! └──────┴─────────┴────────┴──────────┴─────┘
//! ```

use lib_crypto::compute_join_mic;
use lib_types::{AppKey, DevEui, DevNonce, JoinEui, Mic};

use super::errors::DecodeError;
use super::mhdr::{MType, Mhdr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub mhdr: Mhdr,
    pub join_eui: JoinEui,
    pub dev_eui: DevEui,
    pub dev_nonce: DevNonce,
    pub mic: Mic,
}

impl JoinRequest {
    /// Encoded size including MIC
    pub const LENGTH: usize = 23;

    /// Build a signed Join-Request
    pub fn new(join_eui: JoinEui, dev_eui: DevEui, dev_nonce: DevNonce, app_key: &AppKey) -> Self {
        let mut request = Self {
            mhdr: Mhdr::new(MType::JoinRequest),
            join_eui,
            dev_eui,
            dev_nonce,
            mic: Mic::default(),
        };
        request.mic = request.compute_mic(app_key);
        request
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != Self::LENGTH {
            return Err(DecodeError::InvalidLength {
                frame: "join-request",
                expected: "23",
                actual: bytes.len(),
            });
        }

        let mhdr = Mhdr::from_byte(bytes[0]);
        if mhdr.mtype()? != MType::JoinRequest {
            return Err(DecodeError::UnexpectedFrameType {
                expected: "join-request",
                found: mhdr.mtype_bits(),
            });
        }

        let mut join_eui = [0u8; 8];
        join_eui.copy_from_slice(&bytes[1..9]);
        let mut dev_eui = [0u8; 8];
        dev_eui.copy_from_slice(&bytes[9..17]);
        let mut mic = [0u8; Mic::LENGTH];
        mic.copy_from_slice(&bytes[19..23]);

        Ok(Self {
            mhdr,
            join_eui: JoinEui::from_le_bytes(join_eui),
            dev_eui: DevEui::from_le_bytes(dev_eui),
            dev_nonce: DevNonce::from_le_bytes([bytes[17], bytes[18]]),
            mic: Mic(mic),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.signed_bytes();
        out.extend_from_slice(self.mic.as_bytes());
        out
    }

    /// `MHDR || JoinEUI || DevEUI || DevNonce`
    fn signed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LENGTH);
        out.push(self.mhdr.as_byte());
        out.extend_from_slice(&self.join_eui.to_le_bytes());
        out.extend_from_slice(&self.dev_eui.to_le_bytes());
        out.extend_from_slice(&self.dev_nonce.to_le_bytes());
        out
    }

    pub fn compute_mic(&self, app_key: &AppKey) -> Mic {
        compute_join_mic(app_key, &self.signed_bytes())
    }

    pub fn verify_mic(&self, app_key: &AppKey) -> bool {
        self.compute_mic(app_key) == self.mic
    }
}
