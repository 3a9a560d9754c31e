//! Capability contract implemented by each host stack.

use crate::adapter::ScanMode;
use crate::ble::BluetoothState;
use crate::device::DeviceId;
use crate::error::BleError;
use crate::gatt::{CharacteristicRef, DescriptorRef, ServiceRef, WriteType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Options forwarded to the native connect call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectParameters {
    /// Let the host reconnect on its own once the device is in range.
    pub auto_connect: bool,
    /// Force the LE transport on dual-mode hosts.
    pub force_ble_transport: bool,
}

impl ConnectParameters {
    pub fn new(auto_connect: bool, force_ble_transport: bool) -> Self {
        Self {
            auto_connect,
            force_ble_transport,
        }
    }
}

/// Requested connection interval class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionInterval {
    #[default]
    Normal,
    /// Low latency, high power.
    High,
    /// High latency, low power.
    Low,
}

/// A device the host already knows about: connected by another process or
/// paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemDevice {
    pub id: DeviceId,
    pub name: Option<String>,
    pub connected: bool,
}

/// Native Bluetooth LE operations.
///
/// Trigger calls return as soon as the host accepted the request; their
/// outcome arrives later as a [`NativeEvent`](crate::platform::NativeEvent)
/// delivered through an [`EventSink`](crate::platform::EventSink). A trigger
/// may deliver its notification before returning. An `Err` means the request
/// was refused outright and no notification will follow.
#[cfg_attr(test, mockall::automock)]
pub trait BlePlatformBridge: Send + Sync {
    /// Availability and power state at start-up.
    fn initial_state(&self) -> BluetoothState;

    /// Start the native scanner. Returns false if it could not be started.
    fn start_scan(&self, service_uuids: &[Uuid], allow_duplicates: bool, mode: ScanMode) -> bool;

    fn stop_scan(&self);

    /// Completes with `DeviceConnected` or `DeviceConnectionFailed`.
    fn connect(&self, id: DeviceId, parameters: ConnectParameters) -> Result<(), BleError>;

    /// Abort an outstanding connect attempt.
    fn cancel_connect(&self, id: DeviceId);

    /// Completes with `DeviceDisconnected { user_requested: true }`.
    fn disconnect(&self, id: DeviceId) -> Result<(), BleError>;

    fn discover_services(&self, id: DeviceId) -> Result<(), BleError>;

    fn discover_characteristics(&self, service: ServiceRef) -> Result<(), BleError>;

    fn discover_descriptors(&self, characteristic: CharacteristicRef) -> Result<(), BleError>;

    fn read_characteristic(&self, characteristic: CharacteristicRef) -> Result<(), BleError>;

    /// `write_type` is always resolved; never `WriteType::Default`. A
    /// without-response write is complete once this returns `Ok`.
    fn write_characteristic(
        &self,
        characteristic: CharacteristicRef,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<(), BleError>;

    /// Enable or disable local delivery of value notifications. Synchronous.
    fn set_notify(&self, characteristic: CharacteristicRef, enabled: bool) -> Result<(), BleError>;

    fn read_descriptor(&self, descriptor: DescriptorRef) -> Result<(), BleError>;

    fn write_descriptor(&self, descriptor: DescriptorRef, value: &[u8]) -> Result<(), BleError>;

    fn read_rssi(&self, id: DeviceId) -> Result<(), BleError>;

    /// May fail with [`BleError::Unsupported`] on hosts without MTU
    /// negotiation.
    fn request_mtu(&self, id: DeviceId, mtu: u16) -> Result<(), BleError>;

    /// Synchronous; returns whether the host accepted the request.
    fn update_connection_interval(
        &self,
        id: DeviceId,
        interval: ConnectionInterval,
    ) -> Result<bool, BleError>;

    /// Devices connected to the host by other processes, or paired with it.
    fn system_devices(&self, service_uuids: &[Uuid]) -> Vec<SystemDevice>;
}
