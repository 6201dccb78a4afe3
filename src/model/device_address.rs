use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A FANET device address: a 24-bit unsigned integer.
///
/// Rendered as lowercase hex (`abc123`) in text contexts and over the wire
/// in JSON bodies, matching how operators refer to devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceAddress(u32);

impl DeviceAddress {
    pub const MAX: u32 = 0x00FF_FFFF;

    pub fn new(value: u32) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06x}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceAddressParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] std::num::ParseIntError),
    #[error("address {0:#x} exceeds 24-bit range")]
    OutOfRange(u32),
}

impl FromStr for DeviceAddress {
    type Err = DeviceAddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = u32::from_str_radix(s.trim_start_matches("0x"), 16)?;
        DeviceAddress::new(value).ok_or(DeviceAddressParseError::OutOfRange(value))
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_lowercase_hex() {
        let addr = DeviceAddress::new(0xABC123).unwrap();
        assert_eq!(addr.to_string(), "abc123");
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(DeviceAddress::new(0x0100_0000).is_none());
    }

    #[test]
    fn parses_hex_strings() {
        let addr: DeviceAddress = "abc123".parse().unwrap();
        assert_eq!(addr.as_u32(), 0xABC123);
    }

    #[test]
    fn json_roundtrip() {
        let addr = DeviceAddress::new(0x1).unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"000001\"");
        let back: DeviceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
