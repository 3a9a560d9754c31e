use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Characteristic property bits as advertised by the peripheral.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CharacteristicProperties: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        const EXTENDED_PROPERTIES = 0x80;
    }
}

impl CharacteristicProperties {
    pub fn can_read(self) -> bool {
        self.contains(Self::READ)
    }

    pub fn can_write(self) -> bool {
        self.intersects(Self::WRITE | Self::WRITE_WITHOUT_RESPONSE)
    }

    pub fn can_update(self) -> bool {
        self.intersects(Self::NOTIFY | Self::INDICATE)
    }

    /// Whether an explicit write-type preference is backed by these bits.
    pub fn supports(self, write_type: WriteType) -> bool {
        match write_type {
            WriteType::Default => true,
            WriteType::WithResponse => self.contains(Self::WRITE),
            WriteType::WithoutResponse => self.contains(Self::WRITE_WITHOUT_RESPONSE),
        }
    }

    /// Resolve a preference to the write type actually sent to the stack.
    pub fn resolve(self, write_type: WriteType) -> WriteType {
        match write_type {
            WriteType::Default if self.contains(Self::WRITE) => WriteType::WithResponse,
            WriteType::Default => WriteType::WithoutResponse,
            explicit => explicit,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteType {
    #[default]
    Default,
    WithResponse,
    WithoutResponse,
}
