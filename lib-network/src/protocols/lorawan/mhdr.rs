//! MAC header
//!
//! ```text
//!   bit  7 6 5 | 4 3 2 | 1 0
//!       MType  |  RFU  | Major
//! ```
//!
//! The header byte is kept verbatim so RFU and Major bits survive a
//! decode/encode round trip untouched.

use lib_types::Direction;

use super::errors::DecodeError;

/// LoRaWAN message types (bits 7..5 of MHDR)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MType {
    JoinRequest = 0b000,
    JoinAccept = 0b001,
    UnconfirmedDataUp = 0b010,
    UnconfirmedDataDown = 0b011,
    ConfirmedDataUp = 0b100,
    ConfirmedDataDown = 0b101,
}

impl MType {
    /// Map the 3-bit field; Rejoin (0b110) and Proprietary (0b111) are unsupported
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x07 {
            0b000 => Some(Self::JoinRequest),
            0b001 => Some(Self::JoinAccept),
            0b010 => Some(Self::UnconfirmedDataUp),
            0b011 => Some(Self::UnconfirmedDataDown),
            0b100 => Some(Self::ConfirmedDataUp),
            0b101 => Some(Self::ConfirmedDataDown),
            _ => None,
        }
    }

    pub fn is_data(self) -> bool {
        !matches!(self, Self::JoinRequest | Self::JoinAccept)
    }

    pub fn is_confirmed(self) -> bool {
        matches!(self, Self::ConfirmedDataUp | Self::ConfirmedDataDown)
    }

    pub fn direction(self) -> Direction {
        match self {
            Self::JoinRequest | Self::UnconfirmedDataUp | Self::ConfirmedDataUp => Direction::Uplink,
            Self::JoinAccept | Self::UnconfirmedDataDown | Self::ConfirmedDataDown => {
                Direction::Downlink
            }
        }
    }
}

/// MAC header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mhdr(u8);

impl Mhdr {
    /// LoRaWAN R1 major version
    pub const MAJOR_LORAWAN_R1: u8 = 0b00;

    /// Header for `mtype` with Major = LoRaWAN R1 and RFU cleared
    pub const fn new(mtype: MType) -> Self {
        Self(((mtype as u8) << 5) | Self::MAJOR_LORAWAN_R1)
    }

    pub const fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    pub const fn as_byte(&self) -> u8 {
        self.0
    }

    /// Raw 3-bit message type field
    pub const fn mtype_bits(&self) -> u8 {
        self.0 >> 5
    }

    pub fn mtype(&self) -> Result<MType, DecodeError> {
        MType::from_bits(self.mtype_bits()).ok_or(DecodeError::UnknownFrameType(self.mtype_bits()))
    }

    pub const fn major(&self) -> u8 {
        self.0 & 0x03
    }
}
