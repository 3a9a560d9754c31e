//! In-memory peripheral simulator.
//!
//! Records every trigger call and, while auto-respond is on, answers it by
//! delivering the matching notification from inside the call, the way many
//! native stacks do. Tests turn auto-respond off to hold a request open and
//! inject notifications themselves.

use crate::adapter::ScanMode;
use crate::ble::BluetoothState;
use crate::device::{AdvertisementRecord, DeviceId};
use crate::error::BleError;
use crate::gatt::{
    CharacteristicInfo, CharacteristicProperties, CharacteristicRef, DescriptorRef, ServiceInfo,
    ServiceRef, WriteType,
};
use crate::platform::{
    BlePlatformBridge, ConnectParameters, ConnectionInterval, EventSink, NativeEvent, SystemDevice,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const DEFAULT_MAX_MTU: u16 = 247;

/// A trigger call observed by the simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeCall {
    StartScan {
        service_uuids: Vec<Uuid>,
        allow_duplicates: bool,
        mode: ScanMode,
    },
    StopScan,
    Connect {
        id: DeviceId,
        parameters: ConnectParameters,
    },
    CancelConnect(DeviceId),
    Disconnect(DeviceId),
    DiscoverServices(DeviceId),
    DiscoverCharacteristics(ServiceRef),
    DiscoverDescriptors(CharacteristicRef),
    ReadCharacteristic(CharacteristicRef),
    WriteCharacteristic {
        characteristic: CharacteristicRef,
        value: Vec<u8>,
        write_type: WriteType,
    },
    SetNotify {
        characteristic: CharacteristicRef,
        enabled: bool,
    },
    ReadDescriptor(DescriptorRef),
    WriteDescriptor {
        descriptor: DescriptorRef,
        value: Vec<u8>,
    },
    ReadRssi(DeviceId),
    RequestMtu {
        id: DeviceId,
        mtu: u16,
    },
    UpdateConnectionInterval {
        id: DeviceId,
        interval: ConnectionInterval,
    },
}

// ============================================================================
// PERIPHERAL MODEL
// ============================================================================

#[derive(Debug, Clone)]
pub struct SimulatedCharacteristic {
    pub info: CharacteristicInfo,
    pub value: Vec<u8>,
    pub descriptors: Vec<(Uuid, Vec<u8>)>,
}

impl SimulatedCharacteristic {
    pub fn new(id: Uuid, properties: CharacteristicProperties) -> Self {
        Self {
            info: CharacteristicInfo { id, properties },
            value: Vec::new(),
            descriptors: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_descriptor(mut self, id: Uuid) -> Self {
        self.descriptors.push((id, Vec::new()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedService {
    pub info: ServiceInfo,
    pub characteristics: Vec<SimulatedCharacteristic>,
}

impl SimulatedService {
    pub fn primary(id: Uuid) -> Self {
        Self {
            info: ServiceInfo {
                id,
                is_primary: true,
            },
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: SimulatedCharacteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedPeripheral {
    pub id: DeviceId,
    pub name: Option<String>,
    pub rssi: i32,
    pub advertisement: Vec<AdvertisementRecord>,
    pub services: Vec<SimulatedService>,
    pub max_mtu: u16,
    pub paired: bool,
}

impl SimulatedPeripheral {
    pub fn new(id: DeviceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            rssi: -60,
            advertisement: Vec::new(),
            services: Vec::new(),
            max_mtu: DEFAULT_MAX_MTU,
            paired: false,
        }
    }

    pub fn with_rssi(mut self, rssi: i32) -> Self {
        self.rssi = rssi;
        self
    }

    pub fn with_service(mut self, service: SimulatedService) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_advertisement(mut self, record: AdvertisementRecord) -> Self {
        self.advertisement.push(record);
        self
    }

    pub fn paired(mut self) -> Self {
        self.paired = true;
        self
    }

    fn service(&self, id: Uuid) -> Option<&SimulatedService> {
        self.services.iter().find(|s| s.info.id == id)
    }

    fn characteristic_mut(&mut self, at: CharacteristicRef) -> Option<&mut SimulatedCharacteristic> {
        self.services
            .iter_mut()
            .find(|s| s.info.id == at.service.service)?
            .characteristics
            .iter_mut()
            .find(|c| c.info.id == at.characteristic)
    }
}

// ============================================================================
// SIMULATED BRIDGE
// ============================================================================

pub struct SimulatedBridge {
    initial_state: Mutex<BluetoothState>,
    sink: RwLock<Option<EventSink>>,
    peripherals: Mutex<HashMap<DeviceId, SimulatedPeripheral>>,
    connected: Mutex<HashSet<DeviceId>>,
    connect_failures: Mutex<HashMap<DeviceId, String>>,
    calls: Mutex<Vec<BridgeCall>>,
    auto_respond: AtomicBool,
    scan_starts: AtomicBool,
    mtu_supported: AtomicBool,
}

impl SimulatedBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            initial_state: Mutex::new(BluetoothState::On),
            sink: RwLock::new(None),
            peripherals: Mutex::new(HashMap::new()),
            connected: Mutex::new(HashSet::new()),
            connect_failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            auto_respond: AtomicBool::new(true),
            scan_starts: AtomicBool::new(true),
            mtu_supported: AtomicBool::new(true),
        })
    }

    /// Route notifications into the stack.
    pub fn attach(&self, sink: EventSink) {
        *self.sink.write() = Some(sink);
    }

    pub fn add_peripheral(&self, peripheral: SimulatedPeripheral) {
        self.peripherals.lock().insert(peripheral.id, peripheral);
    }

    pub fn set_initial_state(&self, state: BluetoothState) {
        *self.initial_state.lock() = state;
    }

    pub fn set_auto_respond(&self, enabled: bool) {
        self.auto_respond.store(enabled, Ordering::SeqCst);
    }

    pub fn set_scan_starts(&self, starts: bool) {
        self.scan_starts.store(starts, Ordering::SeqCst);
    }

    pub fn set_mtu_supported(&self, supported: bool) {
        self.mtu_supported.store(supported, Ordering::SeqCst);
    }

    /// Make connect attempts to `id` fail with `message`.
    pub fn fail_connect(&self, id: DeviceId, message: impl Into<String>) {
        self.connect_failures.lock().insert(id, message.into());
    }

    pub fn calls(&self) -> Vec<BridgeCall> {
        self.calls.lock().clone()
    }

    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&BridgeCall) -> bool,
    {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn is_linked(&self, id: DeviceId) -> bool {
        self.connected.lock().contains(&id)
    }

    pub fn characteristic_value(&self, at: CharacteristicRef) -> Option<Vec<u8>> {
        self.peripherals
            .lock()
            .get_mut(&at.device())?
            .characteristic_mut(at)
            .map(|c| c.value.clone())
    }

    pub fn descriptor_value(&self, at: DescriptorRef) -> Option<Vec<u8>> {
        self.peripherals
            .lock()
            .get_mut(&at.device())?
            .characteristic_mut(at.characteristic)?
            .descriptors
            .iter()
            .find(|(id, _)| *id == at.descriptor)
            .map(|(_, value)| value.clone())
    }

    /// Inject a notification regardless of auto-respond.
    pub fn deliver(&self, event: NativeEvent) {
        let sink = self.sink.read().clone();
        match sink {
            Some(sink) => sink.deliver(event),
            None => debug!("Simulator has no sink attached, dropping {}", event.kind()),
        }
    }

    /// Report an advertisement from a registered peripheral.
    pub fn advertise(&self, id: DeviceId) {
        let event = self.peripherals.lock().get(&id).map(|p| NativeEvent::DeviceDiscovered {
            id,
            name: p.name.clone(),
            rssi: p.rssi,
            advertisement: p.advertisement.clone(),
        });
        if let Some(event) = event {
            self.deliver(event);
        }
    }

    /// Simulate loss of signal on an established link.
    pub fn drop_link(&self, id: DeviceId) {
        self.connected.lock().remove(&id);
        self.deliver(NativeEvent::DeviceDisconnected {
            id,
            user_requested: false,
        });
    }

    /// Peripheral-side value change, delivered as a notification.
    pub fn push_value(&self, at: CharacteristicRef, value: impl Into<Vec<u8>>) {
        let value = value.into();
        if let Some(peripheral) = self.peripherals.lock().get_mut(&at.device()) {
            if let Some(characteristic) = peripheral.characteristic_mut(at) {
                characteristic.value = value.clone();
            }
        }
        self.deliver(NativeEvent::CharacteristicChanged {
            characteristic: at,
            value,
        });
    }

    fn record(&self, call: BridgeCall) {
        self.calls.lock().push(call);
    }

    /// Build a reply with the peripheral table locked, deliver it unlocked.
    fn reply<F>(&self, id: DeviceId, build: F)
    where
        F: FnOnce(Option<&mut SimulatedPeripheral>) -> NativeEvent,
    {
        if !self.auto_respond.load(Ordering::SeqCst) {
            return;
        }
        let event = {
            let mut peripherals = self.peripherals.lock();
            build(peripherals.get_mut(&id))
        };
        self.deliver(event);
    }
}

fn missing(what: &str) -> String {
    format!("{} not found on simulated peripheral", what)
}

impl BlePlatformBridge for SimulatedBridge {
    fn initial_state(&self) -> BluetoothState {
        *self.initial_state.lock()
    }

    fn start_scan(&self, service_uuids: &[Uuid], allow_duplicates: bool, mode: ScanMode) -> bool {
        self.record(BridgeCall::StartScan {
            service_uuids: service_uuids.to_vec(),
            allow_duplicates,
            mode,
        });
        self.scan_starts.load(Ordering::SeqCst)
    }

    fn stop_scan(&self) {
        self.record(BridgeCall::StopScan);
    }

    fn connect(&self, id: DeviceId, parameters: ConnectParameters) -> Result<(), BleError> {
        self.record(BridgeCall::Connect { id, parameters });
        let failure = self.connect_failures.lock().get(&id).cloned();
        self.reply(id, |peripheral| match (failure, peripheral) {
            (Some(message), _) => NativeEvent::DeviceConnectionFailed { id, message },
            (None, Some(p)) => {
                self.connected.lock().insert(id);
                NativeEvent::DeviceConnected {
                    id,
                    name: p.name.clone(),
                }
            }
            (None, None) => NativeEvent::DeviceConnectionFailed {
                id,
                message: "peripheral out of range".into(),
            },
        });
        Ok(())
    }

    fn cancel_connect(&self, id: DeviceId) {
        self.record(BridgeCall::CancelConnect(id));
    }

    fn disconnect(&self, id: DeviceId) -> Result<(), BleError> {
        self.record(BridgeCall::Disconnect(id));
        self.reply(id, |_| {
            self.connected.lock().remove(&id);
            NativeEvent::DeviceDisconnected {
                id,
                user_requested: true,
            }
        });
        Ok(())
    }

    fn discover_services(&self, id: DeviceId) -> Result<(), BleError> {
        self.record(BridgeCall::DiscoverServices(id));
        self.reply(id, |peripheral| NativeEvent::ServicesDiscovered {
            id,
            result: peripheral
                .map(|p| p.services.iter().map(|s| s.info).collect())
                .ok_or_else(|| missing("peripheral")),
        });
        Ok(())
    }

    fn discover_characteristics(&self, service: ServiceRef) -> Result<(), BleError> {
        self.record(BridgeCall::DiscoverCharacteristics(service));
        self.reply(service.device, |peripheral| NativeEvent::CharacteristicsDiscovered {
            service,
            result: peripheral
                .and_then(|p| p.service(service.service))
                .map(|s| s.characteristics.iter().map(|c| c.info).collect())
                .ok_or_else(|| missing("service")),
        });
        Ok(())
    }

    fn discover_descriptors(&self, characteristic: CharacteristicRef) -> Result<(), BleError> {
        self.record(BridgeCall::DiscoverDescriptors(characteristic));
        self.reply(characteristic.device(), |peripheral| {
            NativeEvent::DescriptorsDiscovered {
                characteristic,
                result: peripheral
                    .and_then(|p| p.characteristic_mut(characteristic))
                    .map(|c| c.descriptors.iter().map(|(id, _)| *id).collect())
                    .ok_or_else(|| missing("characteristic")),
            }
        });
        Ok(())
    }

    fn read_characteristic(&self, characteristic: CharacteristicRef) -> Result<(), BleError> {
        self.record(BridgeCall::ReadCharacteristic(characteristic));
        self.reply(characteristic.device(), |peripheral| NativeEvent::CharacteristicRead {
            characteristic,
            result: peripheral
                .and_then(|p| p.characteristic_mut(characteristic))
                .map(|c| c.value.clone())
                .ok_or_else(|| missing("characteristic")),
        });
        Ok(())
    }

    fn write_characteristic(
        &self,
        characteristic: CharacteristicRef,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<(), BleError> {
        self.record(BridgeCall::WriteCharacteristic {
            characteristic,
            value: value.to_vec(),
            write_type,
        });
        if let Some(peripheral) = self.peripherals.lock().get_mut(&characteristic.device()) {
            if let Some(target) = peripheral.characteristic_mut(characteristic) {
                target.value = value.to_vec();
            }
        }
        if write_type == WriteType::WithResponse {
            self.reply(characteristic.device(), |_| NativeEvent::CharacteristicWritten {
                characteristic,
                result: Ok(()),
            });
        }
        Ok(())
    }

    fn set_notify(&self, characteristic: CharacteristicRef, enabled: bool) -> Result<(), BleError> {
        self.record(BridgeCall::SetNotify {
            characteristic,
            enabled,
        });
        Ok(())
    }

    fn read_descriptor(&self, descriptor: DescriptorRef) -> Result<(), BleError> {
        self.record(BridgeCall::ReadDescriptor(descriptor));
        self.reply(descriptor.device(), |peripheral| NativeEvent::DescriptorRead {
            descriptor,
            result: peripheral
                .and_then(|p| p.characteristic_mut(descriptor.characteristic))
                .and_then(|c| c.descriptors.iter().find(|(id, _)| *id == descriptor.descriptor))
                .map(|(_, value)| value.clone())
                .ok_or_else(|| missing("descriptor")),
        });
        Ok(())
    }

    fn write_descriptor(&self, descriptor: DescriptorRef, value: &[u8]) -> Result<(), BleError> {
        self.record(BridgeCall::WriteDescriptor {
            descriptor,
            value: value.to_vec(),
        });
        let stored = value.to_vec();
        self.reply(descriptor.device(), |peripheral| {
            let slot = peripheral
                .and_then(|p| p.characteristic_mut(descriptor.characteristic))
                .and_then(|c| c.descriptors.iter_mut().find(|(id, _)| *id == descriptor.descriptor));
            NativeEvent::DescriptorWritten {
                descriptor,
                result: match slot {
                    Some((_, current)) => {
                        *current = stored;
                        Ok(())
                    }
                    None => Err(missing("descriptor")),
                },
            }
        });
        Ok(())
    }

    fn read_rssi(&self, id: DeviceId) -> Result<(), BleError> {
        self.record(BridgeCall::ReadRssi(id));
        self.reply(id, |peripheral| NativeEvent::RssiRead {
            id,
            result: peripheral.map(|p| p.rssi).ok_or_else(|| missing("peripheral")),
        });
        Ok(())
    }

    fn request_mtu(&self, id: DeviceId, mtu: u16) -> Result<(), BleError> {
        self.record(BridgeCall::RequestMtu { id, mtu });
        if !self.mtu_supported.load(Ordering::SeqCst) {
            return Err(BleError::Unsupported("MTU negotiation".into()));
        }
        self.reply(id, |peripheral| NativeEvent::MtuChanged {
            id,
            result: peripheral
                .map(|p| mtu.min(p.max_mtu))
                .ok_or_else(|| missing("peripheral")),
        });
        Ok(())
    }

    fn update_connection_interval(
        &self,
        id: DeviceId,
        interval: ConnectionInterval,
    ) -> Result<bool, BleError> {
        self.record(BridgeCall::UpdateConnectionInterval { id, interval });
        Ok(self.is_linked(id))
    }

    fn system_devices(&self, service_uuids: &[Uuid]) -> Vec<SystemDevice> {
        let connected = self.connected.lock().clone();
        let mut devices: Vec<SystemDevice> = self
            .peripherals
            .lock()
            .values()
            .filter(|p| connected.contains(&p.id) || p.paired)
            .filter(|p| {
                service_uuids.is_empty()
                    || p.services.iter().any(|s| service_uuids.contains(&s.info.id))
            })
            .map(|p| SystemDevice {
                id: p.id,
                name: p.name.clone(),
                connected: connected.contains(&p.id),
            })
            .collect();
        devices.sort_by_key(|d| d.id);
        devices
    }
}
