//! A complete GATT session against a simulated heart-rate sensor: discovery,
//! reads, writes, notifications, link parameters and the command queue.

use gattlink_core::gatt::{uuid_from_u16, CLIENT_CHARACTERISTIC_CONFIGURATION};
use gattlink_core::platform::{BridgeCall, SimulatedCharacteristic, SimulatedPeripheral, SimulatedService};
use gattlink_core::{
    Adapter, BleError, BleSettings, CancellationToken, Characteristic, CharacteristicProperties,
    ConnectParameters, ConnectionInterval, Device, DeviceId, NativeEvent, SimulatedBridge,
    WriteType,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const HEART_RATE: Uuid = uuid_from_u16(0x180D);
const MEASUREMENT: Uuid = uuid_from_u16(0x2A37);
const SENSOR_LOCATION: Uuid = uuid_from_u16(0x2A38);
const CONTROL_POINT: Uuid = uuid_from_u16(0x2A39);

fn strap_id() -> DeviceId {
    DeviceId::from_address([0xE8, 0x9F, 0x6D, 0x21, 0x44, 0x0A])
}

fn strap() -> SimulatedPeripheral {
    SimulatedPeripheral::new(strap_id(), "HR Strap")
        .with_rssi(-55)
        .with_service(
            SimulatedService::primary(HEART_RATE)
                .with_characteristic(
                    SimulatedCharacteristic::new(MEASUREMENT, CharacteristicProperties::NOTIFY)
                        .with_descriptor(CLIENT_CHARACTERISTIC_CONFIGURATION),
                )
                .with_characteristic(
                    SimulatedCharacteristic::new(SENSOR_LOCATION, CharacteristicProperties::READ)
                        .with_value([0x01]),
                )
                .with_characteristic(SimulatedCharacteristic::new(
                    CONTROL_POINT,
                    CharacteristicProperties::WRITE
                        | CharacteristicProperties::WRITE_WITHOUT_RESPONSE,
                )),
        )
}

async fn session(sim: &Arc<SimulatedBridge>) -> (Arc<Adapter>, Arc<Device>) {
    sim.add_peripheral(strap());
    let settings = BleSettings {
        notify_settle_delay_ms: 0,
        ..BleSettings::default()
    };
    let adapter = Adapter::new(sim.clone(), settings);
    sim.attach(adapter.sink());
    let device = adapter
        .connect_to_known(strap_id(), ConnectParameters::default(), &CancellationToken::new())
        .await
        .expect("connect");
    (adapter, device)
}

async fn characteristic(device: &Device, id: Uuid) -> Arc<Characteristic> {
    let token = CancellationToken::new();
    device
        .service(HEART_RATE, &token)
        .await
        .expect("services")
        .expect("heart rate service")
        .characteristic(id, &token)
        .await
        .expect("characteristics")
        .expect("characteristic")
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    while !condition() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_full_session() {
    let sim = SimulatedBridge::new();
    let (adapter, device) = session(&sim).await;
    let token = CancellationToken::new();

    let services = device.services(&token).await.expect("services");
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].name(), "Heart Rate");
    assert!(services[0].is_primary());

    let location = characteristic(&device, SENSOR_LOCATION).await;
    assert_eq!(location.read(&token).await, Ok(vec![0x01]));
    assert_eq!(location.value(), vec![0x01]);

    let control = characteristic(&device, CONTROL_POINT).await;
    control.write(&[0x01], &token).await.expect("write with response");
    control
        .set_write_type(WriteType::WithoutResponse)
        .expect("supported write type");
    control.write(&[0x02], &token).await.expect("write without response");
    let writes: Vec<WriteType> = sim
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            BridgeCall::WriteCharacteristic { write_type, .. } => Some(write_type),
            _ => None,
        })
        .collect();
    assert_eq!(writes, vec![WriteType::WithResponse, WriteType::WithoutResponse]);
    assert_eq!(sim.characteristic_value(control.reference()), Some(vec![0x02]));

    let measurement = characteristic(&device, MEASUREMENT).await;
    let mut updates = measurement.value_updates();
    measurement.start_updates(&token).await.expect("start updates");
    assert!(measurement.is_updating());
    let cccd = measurement
        .reference()
        .descriptor(CLIENT_CHARACTERISTIC_CONFIGURATION);
    assert_eq!(sim.descriptor_value(cccd), Some(vec![0x01, 0x00]));

    sim.push_value(measurement.reference(), [0x06, 0x48]);
    assert_eq!(updates.recv().await.expect("notification"), vec![0x06, 0x48]);
    assert_eq!(measurement.value(), vec![0x06, 0x48]);

    measurement.stop_updates(&token).await.expect("stop updates");
    assert!(!measurement.is_updating());
    assert_eq!(sim.descriptor_value(cccd), Some(vec![0x00, 0x00]));
    sim.push_value(measurement.reference(), [0x06, 0x50]);
    assert!(updates.try_recv().is_err());

    assert_eq!(device.update_rssi(&token).await, Ok(-55));
    assert_eq!(device.request_mtu(185, &token).await, Ok(185));
    assert_eq!(
        device.update_connection_interval(ConnectionInterval::High),
        Ok(true)
    );

    adapter.disconnect(&device).await.expect("disconnect");
    assert!(!device.has_link());
    assert_eq!(
        location.read(&token).await,
        Err(BleError::NotConnected(strap_id()))
    );
}

#[tokio::test]
async fn test_validation_errors_issue_no_native_call() {
    let sim = SimulatedBridge::new();
    let (_adapter, device) = session(&sim).await;
    let location = characteristic(&device, SENSOR_LOCATION).await;
    let measurement = characteristic(&device, MEASUREMENT).await;
    sim.clear_calls();
    let token = CancellationToken::new();

    assert!(location.write(&[0x02], &token).await.expect_err("read-only").is_validation());
    assert!(location
        .set_write_type(WriteType::WithResponse)
        .expect_err("unsupported preference")
        .is_validation());
    assert!(measurement.read(&token).await.expect_err("notify-only").is_validation());
    assert!(location.start_updates(&token).await.expect_err("no notify").is_validation());
    assert!(sim.calls().is_empty());
}

#[tokio::test]
async fn test_commands_run_in_submission_order() {
    let sim = SimulatedBridge::new();
    let (_adapter, device) = session(&sim).await;
    let location = characteristic(&device, SENSOR_LOCATION).await;
    let control = characteristic(&device, CONTROL_POINT).await;
    sim.clear_calls();
    let token = CancellationToken::new();

    let (read, write) = tokio::join!(location.read(&token), control.write(&[0x01], &token));
    assert!(read.is_ok());
    assert!(write.is_ok());

    let calls = sim.calls();
    assert!(matches!(calls[0], BridgeCall::ReadCharacteristic(_)));
    assert!(matches!(calls[1], BridgeCall::WriteCharacteristic { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_command_times_out_without_stalling_queue() {
    let sim = SimulatedBridge::new();
    let (_adapter, device) = session(&sim).await;
    let location = characteristic(&device, SENSOR_LOCATION).await;
    let token = CancellationToken::new();

    sim.set_auto_respond(false);
    assert_eq!(
        location.read(&token).await,
        Err(BleError::Timeout(Duration::from_millis(10_000)))
    );

    sim.set_auto_respond(true);
    assert_eq!(location.read(&token).await, Ok(vec![0x01]));
}

#[tokio::test(start_paused = true)]
async fn test_link_loss_rejects_command_queued_behind_other_device() {
    const CYCLING_SPEED: Uuid = uuid_from_u16(0x1816);
    const CSC_FEATURE: Uuid = uuid_from_u16(0x2A5C);
    let cadence_id = DeviceId::from_address([0xC4, 0x7C, 0x8D, 0x6A, 0x13, 0x5B]);

    let sim = SimulatedBridge::new();
    let (adapter, device) = session(&sim).await;
    sim.add_peripheral(
        SimulatedPeripheral::new(cadence_id, "Cadence").with_service(
            SimulatedService::primary(CYCLING_SPEED).with_characteristic(
                SimulatedCharacteristic::new(CSC_FEATURE, CharacteristicProperties::READ)
                    .with_value([0x03]),
            ),
        ),
    );
    let token = CancellationToken::new();
    let cadence = adapter
        .connect_to_known(cadence_id, ConnectParameters::default(), &token)
        .await
        .expect("connect cadence");
    let feature = cadence
        .service(CYCLING_SPEED, &token)
        .await
        .expect("services")
        .expect("cycling speed service")
        .characteristic(CSC_FEATURE, &token)
        .await
        .expect("characteristics")
        .expect("feature");
    let location = characteristic(&device, SENSOR_LOCATION).await;

    sim.set_auto_respond(false);
    let _hung = {
        let location = Arc::clone(&location);
        tokio::spawn(async move { location.read(&CancellationToken::new()).await })
    };
    wait_until(|| sim.count(|c| matches!(c, BridgeCall::ReadCharacteristic(_))) == 1).await;
    let queued = {
        let feature = Arc::clone(&feature);
        tokio::spawn(async move { feature.read(&CancellationToken::new()).await })
    };
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    sim.drop_link(cadence_id);
    let outcome = tokio::time::timeout(Duration::from_secs(1), queued)
        .await
        .expect("queued read settles before the running command times out")
        .expect("read task");
    assert_eq!(outcome, Err(BleError::ConnectionLost(cadence_id)));
    assert_eq!(
        sim.count(|c| matches!(c, BridgeCall::ReadCharacteristic(at) if at.device() == cadence_id)),
        0
    );
}

#[tokio::test]
async fn test_cancelled_read_ignores_late_reply() {
    let sim = SimulatedBridge::new();
    let (_adapter, device) = session(&sim).await;
    let location = characteristic(&device, SENSOR_LOCATION).await;
    sim.set_auto_respond(false);

    let token = CancellationToken::new();
    let pending = {
        let location = Arc::clone(&location);
        let token = token.clone();
        tokio::spawn(async move { location.read(&token).await })
    };
    wait_until(|| sim.count(|c| matches!(c, BridgeCall::ReadCharacteristic(_))) == 1).await;
    token.cancel();
    assert_eq!(pending.await.expect("read task"), Err(BleError::Cancelled));

    sim.deliver(NativeEvent::CharacteristicRead {
        characteristic: location.reference(),
        result: Ok(vec![0x09]),
    });
    assert!(location.value().is_empty());
}

#[tokio::test]
async fn test_cancel_pending_spares_running_command() {
    let sim = SimulatedBridge::new();
    let (adapter, device) = session(&sim).await;
    let location = characteristic(&device, SENSOR_LOCATION).await;
    sim.set_auto_respond(false);

    let first = {
        let location = Arc::clone(&location);
        tokio::spawn(async move { location.read(&CancellationToken::new()).await })
    };
    wait_until(|| sim.count(|c| matches!(c, BridgeCall::ReadCharacteristic(_))) == 1).await;
    let second = {
        let location = Arc::clone(&location);
        tokio::spawn(async move { location.read(&CancellationToken::new()).await })
    };
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    assert_eq!(adapter.cancel_pending_commands(), 1);
    assert_eq!(second.await.expect("second read"), Err(BleError::Cancelled));

    sim.deliver(NativeEvent::CharacteristicRead {
        characteristic: location.reference(),
        result: Ok(vec![0x01]),
    });
    assert_eq!(first.await.expect("first read"), Ok(vec![0x01]));
    assert_eq!(sim.count(|c| matches!(c, BridgeCall::ReadCharacteristic(_))), 1);
}
