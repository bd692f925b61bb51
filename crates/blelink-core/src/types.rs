//! Core types for blelink
//!
//! Newtypes and plain data shared by the state machine, the link backends and
//! the front end.

use core::fmt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{BlelinkError, Result};

// ----------------------------------------------------------------------------
// Generation
// ----------------------------------------------------------------------------

/// Epoch tag attached to every link request and every link completion
///
/// The connection manager bumps its generation on each `connect` and each
/// teardown. A completion carrying any other generation is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    /// Raw counter value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The generation that supersedes this one
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Device Descriptor
// ----------------------------------------------------------------------------

/// A discovered peripheral, as produced by a scanner
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Platform peripheral identifier, used by backends to find the device again
    pub id: String,
    /// Bluetooth address as displayed by the platform
    pub address: String,
    /// Advertised local name (empty when the device advertises none)
    pub name: String,
}

impl DeviceDescriptor {
    /// Create a new device descriptor
    pub fn new(id: impl Into<String>, address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

// ----------------------------------------------------------------------------
// UUID Helpers
// ----------------------------------------------------------------------------

const BASE_UUID_BITS: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;

/// Bluetooth SIG base UUID that 16-bit aliases expand onto
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(BASE_UUID_BITS);

/// Expand a 16-bit alias onto the Bluetooth base UUID
pub const fn uuid_from_u16(alias: u16) -> Uuid {
    Uuid::from_u128(BASE_UUID_BITS | ((alias as u128) << 96))
}

/// Parse a service or characteristic identifier
///
/// Accepts a full 128-bit UUID string or a 16-bit hex alias with an optional
/// `0x` prefix. Aliases `0x0000` and `0xFFFF` are rejected.
pub fn parse_target_uuid(value: &str) -> Result<Uuid> {
    let trimmed = value.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if !hex_part.is_empty() && hex_part.len() <= 4 {
        let alias = u16::from_str_radix(hex_part, 16)
            .map_err(|e| BlelinkError::invalid_uuid(value, e.to_string()))?;
        if alias == 0x0000 || alias == 0xFFFF {
            return Err(BlelinkError::invalid_uuid(
                value,
                "16-bit alias must be between 0x0001 and 0xFFFE",
            ));
        }
        return Ok(uuid_from_u16(alias));
    }

    Uuid::parse_str(trimmed).map_err(|e| BlelinkError::invalid_uuid(value, e.to_string()))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_ordering() {
        let first = Generation::default();
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.value(), 1);
        assert_eq!(second.to_string(), "#1");
    }

    #[test]
    fn test_short_alias_expansion() {
        let uuid = uuid_from_u16(0x1234);
        assert_eq!(
            uuid.to_string(),
            "00001234-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_parse_target_uuid_forms() {
        assert_eq!(parse_target_uuid("1234").unwrap(), uuid_from_u16(0x1234));
        assert_eq!(parse_target_uuid("0x5678").unwrap(), uuid_from_u16(0x5678));
        assert_eq!(parse_target_uuid(" abcd ").unwrap(), uuid_from_u16(0xABCD));

        let full = parse_target_uuid("6E400001-B5A3-F393-E0A9-E50E24DCCA9E").unwrap();
        assert_eq!(full, Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E));
    }

    #[test]
    fn test_parse_target_uuid_rejects_reserved_aliases() {
        assert!(parse_target_uuid("0000").is_err());
        assert!(parse_target_uuid("0xFFFF").is_err());
        assert!(parse_target_uuid("zz").is_err());
        assert!(parse_target_uuid("").is_err());
    }

    #[test]
    fn test_device_description() {
        let device = DeviceDescriptor::new("hci0/dev_AA", "AA:BB:CC:DD:EE:FF", "Sensor");
        assert_eq!(device.to_string(), "Sensor (AA:BB:CC:DD:EE:FF)");
    }
}
