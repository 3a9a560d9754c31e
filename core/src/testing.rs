//! Shared fixtures for unit tests: a simulated heart-rate sensor and helpers
//! to bring it up to a connected state.

use crate::adapter::Adapter;
use crate::config::BleSettings;
use crate::device::{Device, DeviceId};
use crate::gatt::known::uuid_from_u16;
use crate::gatt::{Characteristic, CharacteristicProperties};
use crate::platform::{
    ConnectParameters, SimulatedBridge, SimulatedCharacteristic, SimulatedPeripheral,
    SimulatedService,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const HEART_RATE_SERVICE: Uuid = uuid_from_u16(0x180D);
pub const HEART_RATE_MEASUREMENT: Uuid = uuid_from_u16(0x2A37);
pub const BODY_SENSOR_LOCATION: Uuid = uuid_from_u16(0x2A38);
pub const CONTROL_POINT: Uuid = uuid_from_u16(0x2A39);
pub const BATTERY_SERVICE: Uuid = uuid_from_u16(0x180F);
pub const BATTERY_LEVEL: Uuid = uuid_from_u16(0x2A19);
pub const USER_DESCRIPTION: Uuid = uuid_from_u16(0x2901);

pub fn heart_rate_id() -> DeviceId {
    DeviceId::from_address([0xC4, 0x7C, 0x8D, 0x6A, 0x10, 0x01])
}

pub fn heart_rate_peripheral() -> SimulatedPeripheral {
    SimulatedPeripheral::new(heart_rate_id(), "Sensor HR")
        .with_rssi(-48)
        .with_service(
            SimulatedService::primary(HEART_RATE_SERVICE)
                .with_characteristic(
                    SimulatedCharacteristic::new(
                        HEART_RATE_MEASUREMENT,
                        CharacteristicProperties::NOTIFY,
                    )
                    .with_descriptor(crate::gatt::known::CLIENT_CHARACTERISTIC_CONFIGURATION),
                )
                .with_characteristic(
                    SimulatedCharacteristic::new(
                        BODY_SENSOR_LOCATION,
                        CharacteristicProperties::READ,
                    )
                    .with_value([0x01]),
                )
                .with_characteristic(SimulatedCharacteristic::new(
                    CONTROL_POINT,
                    CharacteristicProperties::WRITE | CharacteristicProperties::WRITE_WITHOUT_RESPONSE,
                )),
        )
        .with_service(
            SimulatedService::primary(BATTERY_SERVICE).with_characteristic(
                SimulatedCharacteristic::new(
                    BATTERY_LEVEL,
                    CharacteristicProperties::READ | CharacteristicProperties::INDICATE,
                )
                .with_value([87])
                .with_descriptor(USER_DESCRIPTION),
            ),
        )
}

/// Defaults without the notification settle delay.
pub fn quiet_settings() -> BleSettings {
    BleSettings {
        notify_settle_delay_ms: 0,
        ..BleSettings::default()
    }
}

/// An adapter wired to `sim`, which already knows the heart-rate sensor.
pub fn adapter(sim: &Arc<SimulatedBridge>) -> Arc<Adapter> {
    sim.add_peripheral(heart_rate_peripheral());
    let adapter = Adapter::new(sim.clone(), quiet_settings());
    sim.attach(adapter.sink());
    adapter
}

pub async fn connected_heart_rate(sim: &Arc<SimulatedBridge>) -> (Arc<Adapter>, Arc<Device>) {
    let adapter = adapter(sim);
    let device = adapter
        .connect_to_known(
            heart_rate_id(),
            ConnectParameters::default(),
            &CancellationToken::new(),
        )
        .await
        .expect("connect");
    (adapter, device)
}

pub async fn characteristic(
    device: &Arc<Device>,
    service: Uuid,
    characteristic: Uuid,
) -> Arc<Characteristic> {
    let token = CancellationToken::new();
    device
        .service(service, &token)
        .await
        .expect("services")
        .expect("service present")
        .characteristic(characteristic, &token)
        .await
        .expect("characteristics")
        .expect("characteristic present")
}
