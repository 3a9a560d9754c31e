//! Notifications delivered by the native collaborator.

use crate::ble::BluetoothState;
use crate::device::{AdvertisementRecord, DeviceId};
use crate::gatt::{CharacteristicInfo, CharacteristicRef, DescriptorRef, ServiceInfo, ServiceRef};
use uuid::Uuid;

/// One native completion or state report. Failures carry the native
/// message verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    StateChanged(BluetoothState),
    DeviceDiscovered {
        id: DeviceId,
        name: Option<String>,
        rssi: i32,
        advertisement: Vec<AdvertisementRecord>,
    },
    DeviceConnected {
        id: DeviceId,
        name: Option<String>,
    },
    DeviceConnectionFailed {
        id: DeviceId,
        message: String,
    },
    DeviceDisconnected {
        id: DeviceId,
        user_requested: bool,
    },
    ServicesDiscovered {
        id: DeviceId,
        result: Result<Vec<ServiceInfo>, String>,
    },
    CharacteristicsDiscovered {
        service: ServiceRef,
        result: Result<Vec<CharacteristicInfo>, String>,
    },
    DescriptorsDiscovered {
        characteristic: CharacteristicRef,
        result: Result<Vec<Uuid>, String>,
    },
    CharacteristicRead {
        characteristic: CharacteristicRef,
        result: Result<Vec<u8>, String>,
    },
    CharacteristicWritten {
        characteristic: CharacteristicRef,
        result: Result<(), String>,
    },
    CharacteristicChanged {
        characteristic: CharacteristicRef,
        value: Vec<u8>,
    },
    DescriptorRead {
        descriptor: DescriptorRef,
        result: Result<Vec<u8>, String>,
    },
    DescriptorWritten {
        descriptor: DescriptorRef,
        result: Result<(), String>,
    },
    RssiRead {
        id: DeviceId,
        result: Result<i32, String>,
    },
    MtuChanged {
        id: DeviceId,
        result: Result<u16, String>,
    },
}

impl NativeEvent {
    /// The device this event concerns, if any.
    pub fn device_id(&self) -> Option<DeviceId> {
        match self {
            NativeEvent::StateChanged(_) => None,
            NativeEvent::DeviceDiscovered { id, .. }
            | NativeEvent::DeviceConnected { id, .. }
            | NativeEvent::DeviceConnectionFailed { id, .. }
            | NativeEvent::DeviceDisconnected { id, .. }
            | NativeEvent::ServicesDiscovered { id, .. }
            | NativeEvent::RssiRead { id, .. }
            | NativeEvent::MtuChanged { id, .. } => Some(*id),
            NativeEvent::CharacteristicsDiscovered { service, .. } => Some(service.device),
            NativeEvent::DescriptorsDiscovered { characteristic, .. }
            | NativeEvent::CharacteristicRead { characteristic, .. }
            | NativeEvent::CharacteristicWritten { characteristic, .. }
            | NativeEvent::CharacteristicChanged { characteristic, .. } => {
                Some(characteristic.device())
            }
            NativeEvent::DescriptorRead { descriptor, .. }
            | NativeEvent::DescriptorWritten { descriptor, .. } => Some(descriptor.device()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NativeEvent::StateChanged(_) => "state-changed",
            NativeEvent::DeviceDiscovered { .. } => "device-discovered",
            NativeEvent::DeviceConnected { .. } => "device-connected",
            NativeEvent::DeviceConnectionFailed { .. } => "device-connection-failed",
            NativeEvent::DeviceDisconnected { .. } => "device-disconnected",
            NativeEvent::ServicesDiscovered { .. } => "services-discovered",
            NativeEvent::CharacteristicsDiscovered { .. } => "characteristics-discovered",
            NativeEvent::DescriptorsDiscovered { .. } => "descriptors-discovered",
            NativeEvent::CharacteristicRead { .. } => "characteristic-read",
            NativeEvent::CharacteristicWritten { .. } => "characteristic-written",
            NativeEvent::CharacteristicChanged { .. } => "characteristic-changed",
            NativeEvent::DescriptorRead { .. } => "descriptor-read",
            NativeEvent::DescriptorWritten { .. } => "descriptor-written",
            NativeEvent::RssiRead { .. } => "rssi-read",
            NativeEvent::MtuChanged { .. } => "mtu-changed",
        }
    }

    /// True for an unrequested link loss on `id`.
    pub(crate) fn is_link_loss(&self, id: DeviceId) -> bool {
        matches!(
            self,
            NativeEvent::DeviceDisconnected { id: lost, user_requested: false } if *lost == id
        )
    }
}
