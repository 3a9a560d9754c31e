use crate::adapter::ScanMode;
use crate::ble::BluetoothState;
use crate::device::DeviceId;
use crate::error::BleError;
use crate::gatt::{CharacteristicRef, DescriptorRef, ServiceRef, WriteType};
use crate::platform::{BlePlatformBridge, ConnectParameters, ConnectionInterval, SystemDevice};
use tracing::warn;
use uuid::Uuid;

/// Bridge for hosts without Bluetooth LE. Every trigger is refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBridge;

impl UnavailableBridge {
    fn refuse(operation: &str) -> Result<(), BleError> {
        warn!("Bluetooth LE unavailable, ignoring {}", operation);
        Err(BleError::Unavailable)
    }
}

impl BlePlatformBridge for UnavailableBridge {
    fn initial_state(&self) -> BluetoothState {
        BluetoothState::Unavailable
    }

    fn start_scan(&self, _service_uuids: &[Uuid], _allow_duplicates: bool, _mode: ScanMode) -> bool {
        warn!("Bluetooth LE unavailable, cannot scan");
        false
    }

    fn stop_scan(&self) {}

    fn connect(&self, _id: DeviceId, _parameters: ConnectParameters) -> Result<(), BleError> {
        Self::refuse("connect")
    }

    fn cancel_connect(&self, _id: DeviceId) {}

    fn disconnect(&self, _id: DeviceId) -> Result<(), BleError> {
        Self::refuse("disconnect")
    }

    fn discover_services(&self, _id: DeviceId) -> Result<(), BleError> {
        Self::refuse("service discovery")
    }

    fn discover_characteristics(&self, _service: ServiceRef) -> Result<(), BleError> {
        Self::refuse("characteristic discovery")
    }

    fn discover_descriptors(&self, _characteristic: CharacteristicRef) -> Result<(), BleError> {
        Self::refuse("descriptor discovery")
    }

    fn read_characteristic(&self, _characteristic: CharacteristicRef) -> Result<(), BleError> {
        Self::refuse("characteristic read")
    }

    fn write_characteristic(
        &self,
        _characteristic: CharacteristicRef,
        _value: &[u8],
        _write_type: WriteType,
    ) -> Result<(), BleError> {
        Self::refuse("characteristic write")
    }

    fn set_notify(&self, _characteristic: CharacteristicRef, _enabled: bool) -> Result<(), BleError> {
        Self::refuse("notification toggle")
    }

    fn read_descriptor(&self, _descriptor: DescriptorRef) -> Result<(), BleError> {
        Self::refuse("descriptor read")
    }

    fn write_descriptor(&self, _descriptor: DescriptorRef, _value: &[u8]) -> Result<(), BleError> {
        Self::refuse("descriptor write")
    }

    fn read_rssi(&self, _id: DeviceId) -> Result<(), BleError> {
        Self::refuse("RSSI read")
    }

    fn request_mtu(&self, _id: DeviceId, _mtu: u16) -> Result<(), BleError> {
        Self::refuse("MTU request")
    }

    fn update_connection_interval(
        &self,
        _id: DeviceId,
        _interval: ConnectionInterval,
    ) -> Result<bool, BleError> {
        Self::refuse("connection interval update").map(|_| false)
    }

    fn system_devices(&self, _service_uuids: &[Uuid]) -> Vec<SystemDevice> {
        Vec::new()
    }
}
