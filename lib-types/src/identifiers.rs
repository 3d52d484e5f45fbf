//! LoRaWAN identifiers
//!
//! Every identifier is a numeric newtype:
//!
//! | Type       | Wire bytes | Meaning                                  |
//! |------------|------------|------------------------------------------|
//! | `DevEui`   | 8          | globally unique device identifier        |
//! | `JoinEui`  | 8          | join server / application identifier     |
//! | `DevAddr`  | 4          | network-assigned session address         |
//! | `NetId`    | 3          | network identifier                       |
//! | `AppNonce` | 3          | server-chosen join nonce                 |
//! | `DevNonce` | 2          | device-chosen join nonce                 |
//!
//! On air every field is little-endian. Display, `FromStr` and serde all use
//! big-endian upper-case hex, which is how the values are printed on device
//! labels and used in cache keys. Converting between the two is the job of
//! `to_le_bytes` / `from_le_bytes`; nothing else in the stack reverses bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::conversion::{hex_to_bytes, slice_to_array};
use crate::errors::ConversionError;

macro_rules! hex_identifier {
    ($(#[$meta:meta])* $name:ident, $repr:ty, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub $repr);

        impl $name {
            /// Size of the field on the wire
            pub const LENGTH: usize = $len;

            /// Wrap a raw value. Bits above `LENGTH * 8` are dropped on encode.
            pub const fn new(value: $repr) -> Self {
                Self(value)
            }

            /// Raw numeric value
            pub const fn value(&self) -> $repr {
                self.0
            }

            /// Decode from wire (little-endian) order
            pub fn from_le_bytes(bytes: [u8; $len]) -> Self {
                let value = bytes
                    .iter()
                    .enumerate()
                    .fold(0u64, |acc, (i, b)| acc | (u64::from(*b) << (8 * i)));
                Self(value as $repr)
            }

            /// Encode in wire (little-endian) order
            pub fn to_le_bytes(self) -> [u8; $len] {
                let value = self.0 as u64;
                let mut out = [0u8; $len];
                for (i, b) in out.iter_mut().enumerate() {
                    *b = (value >> (8 * i)) as u8;
                }
                out
            }

            /// Decode from display (big-endian) order
            pub fn from_be_bytes(mut bytes: [u8; $len]) -> Self {
                bytes.reverse();
                Self::from_le_bytes(bytes)
            }

            /// Encode in display (big-endian) order
            pub fn to_be_bytes(self) -> [u8; $len] {
                let mut bytes = self.to_le_bytes();
                bytes.reverse();
                bytes
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:0width$X}", self.0, width = $len * 2)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex_to_bytes(s)?;
                Ok(Self::from_be_bytes(slice_to_array(&bytes)?))
            }
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                Self(value)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_identifier!(
    /// 64-bit device EUI
    DevEui, u64, 8
);

hex_identifier!(
    /// 64-bit JoinEUI (AppEUI in LoRaWAN 1.0.x)
    JoinEui, u64, 8
);

hex_identifier!(
    /// 32-bit session address assigned by the network at join
    DevAddr, u32, 4
);

hex_identifier!(
    /// 24-bit network identifier
    NetId, u32, 3
);

hex_identifier!(
    /// 24-bit nonce chosen by the network server for each join
    AppNonce, u32, 3
);

hex_identifier!(
    /// 16-bit nonce chosen by the device for each join request
    DevNonce, u16, 2
);

/// LoRaWAN 1.0.x name for [`JoinEui`]
pub type AppEui = JoinEui;

impl NetId {
    /// The 7 least significant bits, copied into the top of every DevAddr
    pub fn nwk_id(&self) -> u8 {
        (self.0 & 0x7f) as u8
    }
}

impl DevAddr {
    /// Network prefix carried in the top 7 bits
    pub fn nwk_id(&self) -> u8 {
        (self.0 >> 25) as u8
    }

    /// Compose an address from a network prefix and a 25-bit network address
    pub fn from_parts(nwk_id: u8, nwk_addr: u32) -> Self {
        Self((u32::from(nwk_id & 0x7f) << 25) | (nwk_addr & 0x01ff_ffff))
    }
}

/// Identifier of a gateway (the LNS station / packet-forwarder host)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayId(String);

impl GatewayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GatewayId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for GatewayId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for GatewayId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Link direction, as encoded in the MIC and keystream blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    Uplink = 0,
    Downlink = 1,
}

impl Direction {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// 4-byte message integrity code
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mic(pub [u8; 4]);

impl Mic {
    pub const LENGTH: usize = 4;

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Debug for Mic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mic({})", hex::encode_upper(self.0))
    }
}

impl From<[u8; 4]> for Mic {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}
