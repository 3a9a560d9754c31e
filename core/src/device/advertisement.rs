use serde::{Deserialize, Serialize};

/// Advertising data type, per the assigned numbers for GAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdvertisementRecordType {
    Flags,
    IncompleteServiceUuids16Bit,
    CompleteServiceUuids16Bit,
    IncompleteServiceUuids32Bit,
    CompleteServiceUuids32Bit,
    IncompleteServiceUuids128Bit,
    CompleteServiceUuids128Bit,
    ShortenedLocalName,
    CompleteLocalName,
    TxPowerLevel,
    Appearance,
    ServiceData16Bit,
    ServiceData32Bit,
    ServiceData128Bit,
    ManufacturerSpecificData,
    Other(u8),
}

impl AdvertisementRecordType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Self::Flags,
            0x02 => Self::IncompleteServiceUuids16Bit,
            0x03 => Self::CompleteServiceUuids16Bit,
            0x04 => Self::IncompleteServiceUuids32Bit,
            0x05 => Self::CompleteServiceUuids32Bit,
            0x06 => Self::IncompleteServiceUuids128Bit,
            0x07 => Self::CompleteServiceUuids128Bit,
            0x08 => Self::ShortenedLocalName,
            0x09 => Self::CompleteLocalName,
            0x0A => Self::TxPowerLevel,
            0x16 => Self::ServiceData16Bit,
            0x19 => Self::Appearance,
            0x20 => Self::ServiceData32Bit,
            0x21 => Self::ServiceData128Bit,
            0xFF => Self::ManufacturerSpecificData,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Flags => 0x01,
            Self::IncompleteServiceUuids16Bit => 0x02,
            Self::CompleteServiceUuids16Bit => 0x03,
            Self::IncompleteServiceUuids32Bit => 0x04,
            Self::CompleteServiceUuids32Bit => 0x05,
            Self::IncompleteServiceUuids128Bit => 0x06,
            Self::CompleteServiceUuids128Bit => 0x07,
            Self::ShortenedLocalName => 0x08,
            Self::CompleteLocalName => 0x09,
            Self::TxPowerLevel => 0x0A,
            Self::ServiceData16Bit => 0x16,
            Self::Appearance => 0x19,
            Self::ServiceData32Bit => 0x20,
            Self::ServiceData128Bit => 0x21,
            Self::ManufacturerSpecificData => 0xFF,
            Self::Other(value) => value,
        }
    }
}

/// One typed field from an advertising packet, already split out by the
/// platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementRecord {
    pub record_type: AdvertisementRecordType,
    pub data: Vec<u8>,
}

impl AdvertisementRecord {
    pub fn new(record_type: AdvertisementRecordType, data: impl Into<Vec<u8>>) -> Self {
        Self {
            record_type,
            data: data.into(),
        }
    }
}
