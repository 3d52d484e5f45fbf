//! Data frames (confirmed and unconfirmed, both directions)
//!
//! ```text
//! ┌──────┬─────────┬───────┬──────┬─────────┬───────┬────────────┬─────┐
//! │ MHDR │ DevAddr │ FCtrl │ FCnt │ FOpts   │ FPort │ FRMPayload │ MIC │
//! │ 1 B  │ 4 B     │ 1 B   │ 2 B  │ 0..15 B │ 0/1 B │ N B        │ 4 B │
//! └──────┴─────────┴───────┴──────┴─────────┴───────┴────────────┴─────┘
//! ```
//!
//! The low nibble of FCtrl is FOptsLen and is derived from [`FOpts`] on
//! encode. FPort 0 marks a payload of MAC commands encrypted with NwkSKey;
//! such a frame must not also carry FOpts. Any other FPort carries
//! application data encrypted with AppSKey.
//!
//! A decoded frame holds its payload exactly as transmitted. Use
//! [`DataFrame::decrypt_payload`] to recover the plaintext and
//! [`DataFrame::build`] to seal an outgoing frame.

use lib_crypto::{compute_data_mic, crypt_frm_payload};
use lib_types::{DevAddr, Direction, Mic, NwkSKey, SessionKeys};

use super::errors::{DecodeError, EncodeError};
use super::mhdr::{MType, Mhdr};

/// MHDR + FHDR without FOpts + MIC
pub const MIN_DATA_FRAME_LENGTH: usize = 12;
/// FOptsLen is a 4-bit field
pub const MAX_FOPTS_LENGTH: usize = 15;
/// Bytes covered by the MIC; the B0 block stores this length in one byte
pub const MAX_SIGNED_LENGTH: usize = 255;

const FHDR_FIXED_END: usize = 8;

// ============================================================================
// FCtrl
// ============================================================================

/// FCtrl flag bits (upper nibble)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FCtrl(u8);

impl FCtrl {
    pub const ADR: u8 = 0x80;
    pub const ADR_ACK_REQ: u8 = 0x40;
    pub const ACK: u8 = 0x20;
    /// FPending on downlinks, ClassB on uplinks
    pub const F_PENDING: u8 = 0x10;

    /// Keep the flag nibble of a raw FCtrl byte
    pub const fn from_byte(byte: u8) -> Self {
        Self(byte & 0xF0)
    }

    pub const fn flags(&self) -> u8 {
        self.0
    }

    pub fn adr(&self) -> bool {
        self.0 & Self::ADR != 0
    }

    pub fn adr_ack_req(&self) -> bool {
        self.0 & Self::ADR_ACK_REQ != 0
    }

    pub fn ack(&self) -> bool {
        self.0 & Self::ACK != 0
    }

    pub fn f_pending(&self) -> bool {
        self.0 & Self::F_PENDING != 0
    }

    pub fn with_adr(self, on: bool) -> Self {
        self.with(Self::ADR, on)
    }

    pub fn with_adr_ack_req(self, on: bool) -> Self {
        self.with(Self::ADR_ACK_REQ, on)
    }

    pub fn with_ack(self, on: bool) -> Self {
        self.with(Self::ACK, on)
    }

    pub fn with_f_pending(self, on: bool) -> Self {
        self.with(Self::F_PENDING, on)
    }

    fn with(self, mask: u8, on: bool) -> Self {
        if on {
            Self(self.0 | mask)
        } else {
            Self(self.0 & !mask)
        }
    }
}

// ============================================================================
// FOpts / payload
// ============================================================================

/// Piggybacked MAC commands, at most 15 bytes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FOpts(Vec<u8>);

impl FOpts {
    pub fn new(bytes: Vec<u8>) -> Result<Self, EncodeError> {
        if bytes.len() > MAX_FOPTS_LENGTH {
            return Err(EncodeError::FOptsTooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything after FHDR and before the MIC
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FramePayload {
    /// No FPort, no FRMPayload
    #[default]
    None,
    /// FPort 0
    MacCommands(Vec<u8>),
    /// FPort 1..=255
    Application { fport: u8, data: Vec<u8> },
}

impl FramePayload {
    pub fn fport(&self) -> Option<u8> {
        match self {
            Self::None => None,
            Self::MacCommands(_) => Some(0),
            Self::Application { fport, .. } => Some(*fport),
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            Self::None => &[],
            Self::MacCommands(data) | Self::Application { data, .. } => data,
        }
    }

    /// Same variant with `data` run through the FRMPayload cipher
    fn crypt(&self, keys: &SessionKeys, direction: Direction, dev_addr: DevAddr, fcnt: u32) -> Self {
        match self {
            Self::None => Self::None,
            Self::MacCommands(data) => Self::MacCommands(crypt_frm_payload(
                keys.nwk_s_key.as_bytes(),
                direction,
                dev_addr,
                fcnt,
                data,
            )),
            Self::Application { fport, data } => Self::Application {
                fport: *fport,
                data: crypt_frm_payload(keys.app_s_key.as_bytes(), direction, dev_addr, fcnt, data),
            },
        }
    }
}

// ============================================================================
// DataFrame
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub mhdr: Mhdr,
    pub dev_addr: DevAddr,
    pub fctrl: FCtrl,
    /// Low 16 bits of the frame counter, as transmitted
    pub fcnt: u16,
    pub fopts: FOpts,
    pub payload: FramePayload,
    pub mic: Mic,
}

impl DataFrame {
    /// Seal an outgoing frame: encrypt `plaintext`, then sign.
    ///
    /// `fcnt` is the full 32-bit counter; its low 16 bits go on the wire.
    pub fn build(
        mtype: MType,
        dev_addr: DevAddr,
        fctrl: FCtrl,
        fcnt: u32,
        fopts: FOpts,
        plaintext: FramePayload,
        keys: &SessionKeys,
    ) -> Result<Self, EncodeError> {
        let mhdr = Mhdr::new(mtype);
        if !mtype.is_data() {
            return Err(EncodeError::MessageTypeMismatch(mhdr.mtype_bits()));
        }

        let mut frame = Self {
            mhdr,
            dev_addr,
            fctrl,
            fcnt: fcnt as u16,
            fopts,
            payload: plaintext.crypt(keys, mtype.direction(), dev_addr, fcnt),
            mic: Mic::default(),
        };
        frame.mic = frame.compute_mic(&keys.nwk_s_key, fcnt)?;
        Ok(frame)
    }

    /// Unconfirmed downlink acknowledging a confirmed uplink
    pub fn ack(dev_addr: DevAddr, fcnt_down: u32, keys: &SessionKeys) -> Result<Self, EncodeError> {
        Self::build(
            MType::UnconfirmedDataDown,
            dev_addr,
            FCtrl::default().with_ack(true),
            fcnt_down,
            FOpts::empty(),
            FramePayload::None,
            keys,
        )
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < MIN_DATA_FRAME_LENGTH {
            return Err(DecodeError::TooShort {
                min: MIN_DATA_FRAME_LENGTH,
                actual: bytes.len(),
            });
        }

        let mhdr = Mhdr::from_byte(bytes[0]);
        if !mhdr.mtype()?.is_data() {
            return Err(DecodeError::UnexpectedFrameType {
                expected: "data",
                found: mhdr.mtype_bits(),
            });
        }

        let dev_addr = DevAddr::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let fctrl = FCtrl::from_byte(bytes[5]);
        let fopts_len = usize::from(bytes[5] & 0x0F);
        let fcnt = u16::from_le_bytes([bytes[6], bytes[7]]);

        let mic_start = bytes.len() - Mic::LENGTH;
        let fopts_end = FHDR_FIXED_END + fopts_len;
        if fopts_end > mic_start {
            return Err(DecodeError::InvalidFOptsLength {
                declared: fopts_len,
                available: mic_start - FHDR_FIXED_END,
            });
        }
        let fopts = FOpts(bytes[FHDR_FIXED_END..fopts_end].to_vec());

        let payload = match bytes[fopts_end..mic_start].split_first() {
            None => FramePayload::None,
            Some((0, data)) => {
                if !fopts.is_empty() {
                    return Err(DecodeError::InvalidMacCommandFrame);
                }
                FramePayload::MacCommands(data.to_vec())
            }
            Some((&fport, data)) => FramePayload::Application {
                fport,
                data: data.to_vec(),
            },
        };

        let mut mic = [0u8; Mic::LENGTH];
        mic.copy_from_slice(&bytes[mic_start..]);

        Ok(Self {
            mhdr,
            dev_addr,
            fctrl,
            fcnt,
            fopts,
            payload,
            mic: Mic(mic),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = self.signed_bytes()?;
        out.extend_from_slice(self.mic.as_bytes());
        Ok(out)
    }

    /// `MHDR || FHDR || FPort || FRMPayload`
    fn signed_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        if self.fopts.len() > MAX_FOPTS_LENGTH {
            return Err(EncodeError::FOptsTooLong(self.fopts.len()));
        }
        match &self.payload {
            FramePayload::MacCommands(_) if !self.fopts.is_empty() => {
                return Err(EncodeError::InvalidMacCommandFrame)
            }
            FramePayload::Application { fport: 0, data } if !data.is_empty() || !self.fopts.is_empty() => {
                return Err(EncodeError::InvalidMacCommandFrame)
            }
            _ => {}
        }

        let mut out = Vec::with_capacity(
            MIN_DATA_FRAME_LENGTH + self.fopts.len() + 1 + self.payload.data().len(),
        );
        out.push(self.mhdr.as_byte());
        out.extend_from_slice(&self.dev_addr.to_le_bytes());
        out.push(self.fctrl.flags() | self.fopts.len() as u8);
        out.extend_from_slice(&self.fcnt.to_le_bytes());
        out.extend_from_slice(self.fopts.as_slice());
        if let Some(fport) = self.payload.fport() {
            out.push(fport);
            out.extend_from_slice(self.payload.data());
        }

        if out.len() > MAX_SIGNED_LENGTH {
            return Err(EncodeError::FrameTooLong(out.len() + Mic::LENGTH));
        }
        Ok(out)
    }

    /// Direction from the message type (odd data types are downlinks)
    pub fn direction(&self) -> Direction {
        if self.mhdr.mtype_bits() & 0x01 == 1 {
            Direction::Downlink
        } else {
            Direction::Uplink
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.mhdr.mtype(), Ok(mtype) if mtype.is_confirmed())
    }

    pub fn fport(&self) -> Option<u8> {
        self.payload.fport()
    }

    /// MIC over the frame as it stands.
    ///
    /// Pass `u32::from(frame.fcnt)` for 16-bit counters, or the
    /// reconstructed 32-bit counter when the session uses them.
    pub fn compute_mic(&self, nwk_s_key: &NwkSKey, fcnt: u32) -> Result<Mic, EncodeError> {
        let msg = self.signed_bytes()?;
        Ok(compute_data_mic(nwk_s_key, self.direction(), self.dev_addr, fcnt, &msg))
    }

    pub fn verify_mic(&self, nwk_s_key: &NwkSKey, fcnt: u32) -> bool {
        matches!(self.compute_mic(nwk_s_key, fcnt), Ok(mic) if mic == self.mic)
    }

    /// Plaintext of the carried payload. MAC commands (FPort 0) are
    /// decrypted with NwkSKey, application data with AppSKey.
    pub fn decrypt_payload(&self, keys: &SessionKeys, fcnt: u32) -> FramePayload {
        self.payload.crypt(keys, self.direction(), self.dev_addr, fcnt)
    }
}
