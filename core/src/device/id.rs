//! Stable device identity.
//!
//! Hosts that expose a hardware address get an identity whose last six bytes
//! are that address; hosts with opaque identifiers wrap their UUID directly.

use crate::error::BleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const ADDRESS_OFFSET: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(Uuid);

impl DeviceId {
    /// Derive the identity from a 48-bit hardware address.
    pub fn from_address(address: [u8; 6]) -> Self {
        let mut bytes = [0u8; 16];
        bytes[ADDRESS_OFFSET..].copy_from_slice(&address);
        Self(Uuid::from_bytes(bytes))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// The hardware address, if this identity was derived from one.
    pub fn address(&self) -> Option<[u8; 6]> {
        let bytes = self.0.as_bytes();
        if bytes[..ADDRESS_OFFSET].iter().any(|b| *b != 0) {
            return None;
        }
        let mut address = [0u8; 6];
        address.copy_from_slice(&bytes[ADDRESS_OFFSET..]);
        Some(address)
    }

    /// Parse a colon separated address such as `AA:BB:CC:DD:EE:FF`.
    pub fn parse_address(text: &str) -> Result<Self, BleError> {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() != 6 {
            return Err(BleError::Validation(format!(
                "Hardware address must have 6 octets: {}",
                text
            )));
        }

        let mut address = [0u8; 6];
        for (slot, part) in address.iter_mut().zip(parts) {
            *slot = u8::from_str_radix(part, 16).map_err(|_| {
                BleError::Validation(format!("Invalid octet '{}' in address {}", part, text))
            })?;
        }
        Ok(Self::from_address(address))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address() {
            Some(a) => write!(
                f,
                "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
                a[0], a[1], a[2], a[3], a[4], a[5]
            ),
            None => write!(f, "{}", self.0.hyphenated()),
        }
    }
}

impl FromStr for DeviceId {
    type Err = BleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(uuid) = Uuid::parse_str(s) {
            return Ok(Self(uuid));
        }
        Self::parse_address(s)
    }
}

impl From<Uuid> for DeviceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
