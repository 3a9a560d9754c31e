/// GATT object model
///
/// Services, characteristics and descriptors discovered on a connected
/// device. Each level caches its children once per connection epoch and
/// routes every native request through the shared command queue.
pub mod characteristic;
pub mod descriptor;
pub mod known;
pub mod properties;
pub mod service;

pub use characteristic::Characteristic;
pub use descriptor::Descriptor;
pub use known::{uuid_from_u16, CLIENT_CHARACTERISTIC_CONFIGURATION};
pub use properties::{CharacteristicProperties, WriteType};
pub use service::Service;

use crate::device::DeviceId;
use std::fmt;
use uuid::Uuid;

// Attributes are addressed by value so notifications can be correlated
// without holding references into the object model.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceRef {
    pub device: DeviceId,
    pub service: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    pub service: ServiceRef,
    pub characteristic: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRef {
    pub characteristic: CharacteristicRef,
    pub descriptor: Uuid,
}

impl ServiceRef {
    pub fn characteristic(self, characteristic: Uuid) -> CharacteristicRef {
        CharacteristicRef {
            service: self,
            characteristic,
        }
    }
}

impl CharacteristicRef {
    pub fn device(&self) -> DeviceId {
        self.service.device
    }

    pub fn descriptor(self, descriptor: Uuid) -> DescriptorRef {
        DescriptorRef {
            characteristic: self,
            descriptor,
        }
    }
}

impl DescriptorRef {
    pub fn device(&self) -> DeviceId {
        self.characteristic.service.device
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.service)
    }
}

impl fmt::Display for CharacteristicRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

impl fmt::Display for DescriptorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.characteristic, self.descriptor)
    }
}

/// A service as reported by native discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceInfo {
    pub id: Uuid,
    pub is_primary: bool,
}

/// A characteristic as reported by native discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub id: Uuid,
    pub properties: CharacteristicProperties,
}
