use crate::device::LinkScope;
use crate::error::BleError;
use crate::gatt::known::{
    self, CLIENT_CHARACTERISTIC_CONFIGURATION, DISABLE_NOTIFICATION_VALUE,
    ENABLE_INDICATION_VALUE, ENABLE_NOTIFICATION_VALUE,
};
use crate::gatt::{
    CharacteristicInfo, CharacteristicProperties, CharacteristicRef, Descriptor, ServiceRef,
    WriteType,
};
use crate::platform::NativeEvent;
use crate::sync::Subscription;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// A characteristic of a discovered service.
///
/// Capability checks (`can_read`, `can_write`, `can_update`) run before any
/// native call; a request the properties do not allow fails with
/// [`BleError::Validation`] and never reaches the host stack.
pub struct Characteristic {
    info: CharacteristicInfo,
    at: CharacteristicRef,
    scope: LinkScope,
    this: Weak<Characteristic>,
    write_type: Mutex<WriteType>,
    value: RwLock<Vec<u8>>,
    descriptors: Mutex<Option<Vec<Arc<Descriptor>>>>,
    discovery: tokio::sync::Mutex<()>,
    updates: broadcast::Sender<Vec<u8>>,
    forwarding: Mutex<Option<Subscription>>,
}

impl Characteristic {
    pub(crate) fn new(info: CharacteristicInfo, service: ServiceRef, scope: LinkScope) -> Arc<Self> {
        let (updates, _) = broadcast::channel(scope.ctx().settings.event_channel_capacity.max(1));
        Arc::new_cyclic(|this| Self {
            info,
            at: service.characteristic(info.id),
            scope,
            this: this.clone(),
            write_type: Mutex::new(WriteType::Default),
            value: RwLock::new(Vec::new()),
            descriptors: Mutex::new(None),
            discovery: tokio::sync::Mutex::new(()),
            updates,
            forwarding: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.info.id
    }

    pub fn name(&self) -> &'static str {
        known::characteristic_name(&self.info.id).unwrap_or("Unknown Characteristic")
    }

    pub fn reference(&self) -> CharacteristicRef {
        self.at
    }

    pub fn properties(&self) -> CharacteristicProperties {
        self.info.properties
    }

    pub fn can_read(&self) -> bool {
        self.info.properties.can_read()
    }

    pub fn can_write(&self) -> bool {
        self.info.properties.can_write()
    }

    pub fn can_update(&self) -> bool {
        self.info.properties.can_update()
    }

    pub fn write_type(&self) -> WriteType {
        *self.write_type.lock()
    }

    /// Set the write-type preference. An explicit type the properties do
    /// not advertise is rejected here rather than at write time.
    pub fn set_write_type(&self, write_type: WriteType) -> Result<(), BleError> {
        if !self.info.properties.supports(write_type) {
            return Err(BleError::Validation(format!(
                "Characteristic {} does not support {:?} writes",
                self.info.id, write_type
            )));
        }
        *self.write_type.lock() = write_type;
        Ok(())
    }

    /// Last value read, written or notified.
    pub fn value(&self) -> Vec<u8> {
        self.value.read().clone()
    }

    pub fn string_value(&self) -> String {
        String::from_utf8_lossy(&self.value.read()).into_owned()
    }

    /// Values pushed by the peripheral while updates are started.
    pub fn value_updates(&self) -> broadcast::Receiver<Vec<u8>> {
        self.updates.subscribe()
    }

    pub fn is_updating(&self) -> bool {
        self.forwarding.lock().is_some()
    }

    // ------------------------------------------------------------------------
    // Request/response operations
    // ------------------------------------------------------------------------

    pub async fn read(&self, token: &CancellationToken) -> Result<Vec<u8>, BleError> {
        if !self.can_read() {
            return Err(BleError::Validation(format!(
                "Characteristic {} does not support read",
                self.info.id
            )));
        }

        let at = self.at;
        let value = self
            .scope
            .request(
                token,
                move |bridge| bridge.read_characteristic(at),
                move |event| match event {
                    NativeEvent::CharacteristicRead {
                        characteristic,
                        result,
                    } if *characteristic == at => Some(result.clone().map_err(BleError::Native)),
                    _ => None,
                },
            )
            .await?;
        *self.value.write() = value.clone();
        Ok(value)
    }

    /// Write `data` using the current write-type preference. `Default`
    /// resolves to with-response when the characteristic supports it.
    pub async fn write(&self, data: &[u8], token: &CancellationToken) -> Result<(), BleError> {
        if !self.can_write() {
            return Err(BleError::Validation(format!(
                "Characteristic {} does not support write",
                self.info.id
            )));
        }

        let at = self.at;
        let payload = data.to_vec();
        match self.info.properties.resolve(self.write_type()) {
            WriteType::WithoutResponse => {
                self.scope
                    .invoke(token, move |bridge| {
                        bridge.write_characteristic(at, &payload, WriteType::WithoutResponse)
                    })
                    .await?
            }
            _ => {
                self.scope
                    .request(
                        token,
                        move |bridge| {
                            bridge.write_characteristic(at, &payload, WriteType::WithResponse)
                        },
                        move |event| match event {
                            NativeEvent::CharacteristicWritten {
                                characteristic,
                                result,
                            } if *characteristic == at => {
                                Some(result.clone().map_err(BleError::Native))
                            }
                            _ => None,
                        },
                    )
                    .await?
            }
        }

        *self.value.write() = data.to_vec();
        Ok(())
    }

    /// Enable value notifications or indications and start forwarding them
    /// to [`Characteristic::value_updates`].
    pub async fn start_updates(&self, token: &CancellationToken) -> Result<(), BleError> {
        if !self.can_update() {
            return Err(BleError::Validation(format!(
                "Characteristic {} supports neither notify nor indicate",
                self.info.id
            )));
        }
        self.scope.ensure_linked()?;

        self.forward_updates();
        if let Err(err) = self.enable_updates(token).await {
            self.forwarding.lock().take();
            return Err(err);
        }
        debug!("Updates started for {}", self.at);
        Ok(())
    }

    async fn enable_updates(&self, token: &CancellationToken) -> Result<(), BleError> {
        let at = self.at;
        self.scope
            .invoke(token, move |bridge| bridge.set_notify(at, true))
            .await?;

        let settle = self.scope.ctx().settings.notify_settle_delay();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let enable = if self.info.properties.contains(CharacteristicProperties::NOTIFY) {
            ENABLE_NOTIFICATION_VALUE
        } else {
            ENABLE_INDICATION_VALUE
        };
        self.write_configuration(&enable, token).await
    }

    pub async fn stop_updates(&self, token: &CancellationToken) -> Result<(), BleError> {
        if !self.can_update() {
            return Err(BleError::Validation(format!(
                "Characteristic {} supports neither notify nor indicate",
                self.info.id
            )));
        }
        self.scope.ensure_linked()?;

        let at = self.at;
        self.scope
            .invoke(token, move |bridge| bridge.set_notify(at, false))
            .await?;
        self.write_configuration(&DISABLE_NOTIFICATION_VALUE, token).await?;

        self.forwarding.lock().take();
        debug!("Updates stopped for {}", self.at);
        Ok(())
    }

    /// Write to the client characteristic configuration descriptor, or the
    /// first descriptor when the peripheral does not expose one.
    async fn write_configuration(&self, value: &[u8], token: &CancellationToken) -> Result<(), BleError> {
        let descriptors = self.descriptors(token).await?;
        let target = descriptors
            .iter()
            .find(|d| d.id() == CLIENT_CHARACTERISTIC_CONFIGURATION)
            .or_else(|| descriptors.first());

        match target {
            Some(descriptor) => descriptor.write(value, token).await,
            None => {
                warn!("No descriptor on {} to configure updates", self.at);
                Ok(())
            }
        }
    }

    fn forward_updates(&self) {
        let mut forwarding = self.forwarding.lock();
        if forwarding.is_some() {
            return;
        }

        let at = self.at;
        let target = self.this.clone();
        *forwarding = Some(self.scope.ctx().hub.subscribe(move |event| {
            if let NativeEvent::CharacteristicChanged {
                characteristic,
                value,
            } = event
            {
                if *characteristic != at {
                    return;
                }
                if let Some(characteristic) = target.upgrade() {
                    *characteristic.value.write() = value.clone();
                    // No receivers is fine.
                    let _ = characteristic.updates.send(value.clone());
                }
            }
        }));
    }

    // ------------------------------------------------------------------------
    // Descriptors
    // ------------------------------------------------------------------------

    pub async fn descriptors(&self, token: &CancellationToken) -> Result<Vec<Arc<Descriptor>>, BleError> {
        if let Some(cached) = self.descriptors.lock().clone() {
            return Ok(cached);
        }

        let _round = self.discovery.lock().await;
        if let Some(cached) = self.descriptors.lock().clone() {
            return Ok(cached);
        }

        let at = self.at;
        let discovered = self
            .scope
            .request(
                token,
                move |bridge| bridge.discover_descriptors(at),
                move |event| match event {
                    NativeEvent::DescriptorsDiscovered {
                        characteristic,
                        result,
                    } if *characteristic == at => Some(result.clone().map_err(BleError::Native)),
                    _ => None,
                },
            )
            .await?;

        let descriptors: Vec<Arc<Descriptor>> = discovered
            .into_iter()
            .map(|id| Descriptor::new(at.descriptor(id), self.scope.clone()))
            .collect();

        let mut cache = self.descriptors.lock();
        if self.scope.is_stale() {
            return Err(BleError::Cancelled);
        }
        *cache = Some(descriptors.clone());
        Ok(descriptors)
    }

    pub async fn descriptor(
        &self,
        id: Uuid,
        token: &CancellationToken,
    ) -> Result<Option<Arc<Descriptor>>, BleError> {
        let descriptors = self.descriptors(token).await?;
        Ok(descriptors.into_iter().find(|d| d.id() == id))
    }

    pub(crate) fn dispose(&self) {
        self.forwarding.lock().take();
        self.descriptors.lock().take();
    }
}

impl fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Characteristic")
            .field("id", &self.info.id)
            .field("name", &self.name())
            .field("properties", &self.info.properties)
            .field("write_type", &self.write_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BleSettings;
    use crate::context::BleContext;
    use crate::device::DeviceId;
    use crate::gatt::uuid_from_u16;
    use crate::platform::{BridgeCall, MockBlePlatformBridge, SimulatedBridge};
    use crate::testing::{
        self, BATTERY_LEVEL, BATTERY_SERVICE, BODY_SENSOR_LOCATION, CONTROL_POINT,
        HEART_RATE_MEASUREMENT, HEART_RATE_SERVICE,
    };

    /// A characteristic wired to a mock bridge with no expectations, so any
    /// native call fails the test.
    fn offline(properties: CharacteristicProperties) -> Arc<Characteristic> {
        let ctx = BleContext::new(Arc::new(MockBlePlatformBridge::new()), BleSettings::default());
        let device = DeviceId::from_address([0, 0, 0, 0, 0, 7]);
        let scope = LinkScope::new(ctx, Weak::new(), device, 0, CancellationToken::new());
        let service = ServiceRef {
            device,
            service: uuid_from_u16(0x1800),
        };
        Characteristic::new(
            CharacteristicInfo {
                id: uuid_from_u16(0x2A00),
                properties,
            },
            service,
            scope,
        )
    }

    #[test]
    fn test_explicit_write_type_validated_on_set() {
        let cases = [
            (CharacteristicProperties::WRITE, WriteType::WithResponse, true),
            (CharacteristicProperties::WRITE, WriteType::WithoutResponse, false),
            (CharacteristicProperties::WRITE_WITHOUT_RESPONSE, WriteType::WithResponse, false),
            (CharacteristicProperties::WRITE_WITHOUT_RESPONSE, WriteType::WithoutResponse, true),
            (CharacteristicProperties::READ, WriteType::Default, true),
        ];

        for (properties, write_type, accepted) in cases {
            let characteristic = offline(properties);
            let result = characteristic.set_write_type(write_type);
            assert_eq!(result.is_ok(), accepted, "{:?} / {:?}", properties, write_type);
            if !accepted {
                assert!(matches!(result, Err(BleError::Validation(_))));
                assert_eq!(characteristic.write_type(), WriteType::Default);
            }
        }
    }

    #[tokio::test]
    async fn test_unsupported_operations_fail_before_native_call() {
        let token = CancellationToken::new();

        let read_only = offline(CharacteristicProperties::READ);
        assert!(matches!(
            read_only.write(&[1], &token).await,
            Err(BleError::Validation(_))
        ));
        assert!(matches!(
            read_only.start_updates(&token).await,
            Err(BleError::Validation(_))
        ));
        assert!(matches!(
            read_only.stop_updates(&token).await,
            Err(BleError::Validation(_))
        ));

        let write_only = offline(CharacteristicProperties::WRITE);
        assert!(matches!(
            write_only.read(&token).await,
            Err(BleError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_capable_but_unlinked_fails_fast() {
        let characteristic = offline(CharacteristicProperties::READ | CharacteristicProperties::WRITE);
        let token = CancellationToken::new();
        assert!(matches!(
            characteristic.read(&token).await,
            Err(BleError::NotConnected(_))
        ));
        assert!(matches!(
            characteristic.write(&[0], &token).await,
            Err(BleError::NotConnected(_))
        ));
    }

    #[tokio::test]
    async fn test_read_caches_value() {
        let sim = SimulatedBridge::new();
        let (_adapter, device) = testing::connected_heart_rate(&sim).await;
        let location = testing::characteristic(&device, HEART_RATE_SERVICE, BODY_SENSOR_LOCATION).await;

        let value = location.read(&CancellationToken::new()).await.expect("read");
        assert_eq!(value, vec![0x01]);
        assert_eq!(location.value(), vec![0x01]);
    }

    #[tokio::test]
    async fn test_default_write_type_resolution_reaches_bridge() {
        let sim = SimulatedBridge::new();
        let (_adapter, device) = testing::connected_heart_rate(&sim).await;
        let control = testing::characteristic(&device, HEART_RATE_SERVICE, CONTROL_POINT).await;
        let token = CancellationToken::new();

        control.write(&[0x01], &token).await.expect("write with response");
        control
            .set_write_type(WriteType::WithoutResponse)
            .expect("supported");
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
        assert_eq!(control.value(), vec![0x02]);
        assert_eq!(sim.characteristic_value(control.reference()), Some(vec![0x02]));
    }

    #[tokio::test]
    async fn test_start_updates_configures_cccd_and_forwards_values() {
        let sim = SimulatedBridge::new();
        let (_adapter, device) = testing::connected_heart_rate(&sim).await;
        let measurement =
            testing::characteristic(&device, HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT).await;
        let mut updates = measurement.value_updates();
        let token = CancellationToken::new();

        measurement.start_updates(&token).await.expect("start");
        assert!(measurement.is_updating());
        let cccd = measurement.reference().descriptor(CLIENT_CHARACTERISTIC_CONFIGURATION);
        assert_eq!(sim.descriptor_value(cccd), Some(ENABLE_NOTIFICATION_VALUE.to_vec()));

        sim.push_value(measurement.reference(), vec![0x00, 0x48]);
        assert_eq!(updates.recv().await.expect("update"), vec![0x00, 0x48]);
        assert_eq!(measurement.value(), vec![0x00, 0x48]);

        measurement.stop_updates(&token).await.expect("stop");
        assert!(!measurement.is_updating());
        assert_eq!(sim.descriptor_value(cccd), Some(DISABLE_NOTIFICATION_VALUE.to_vec()));
        assert_eq!(
            sim.count(|c| matches!(c, BridgeCall::SetNotify { enabled: false, .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_indicate_falls_back_to_first_descriptor() {
        let sim = SimulatedBridge::new();
        let (_adapter, device) = testing::connected_heart_rate(&sim).await;
        let battery = testing::characteristic(&device, BATTERY_SERVICE, BATTERY_LEVEL).await;

        battery
            .start_updates(&CancellationToken::new())
            .await
            .expect("start");

        let user_description = battery.reference().descriptor(uuid_from_u16(0x2901));
        assert_eq!(
            sim.descriptor_value(user_description),
            Some(ENABLE_INDICATION_VALUE.to_vec())
        );
    }

    #[tokio::test]
    async fn test_pending_read_rejects_when_link_is_lost() {
        let sim = SimulatedBridge::new();
        let (_adapter, device) = testing::connected_heart_rate(&sim).await;
        let location = testing::characteristic(&device, HEART_RATE_SERVICE, BODY_SENSOR_LOCATION).await;
        sim.set_auto_respond(false);

        let pending = {
            let location = location.clone();
            tokio::spawn(async move { location.read(&CancellationToken::new()).await })
        };
        while sim.count(|c| matches!(c, BridgeCall::ReadCharacteristic(_))) == 0 {
            tokio::task::yield_now().await;
        }
        sim.drop_link(device.id());

        assert_eq!(
            pending.await.expect("read task"),
            Err(BleError::ConnectionLost(device.id()))
        );
        assert!(!device.has_link());
    }

    #[tokio::test]
    async fn test_queued_read_behind_lost_link_reports_loss() {
        let sim = SimulatedBridge::new();
        let (_adapter, device) = testing::connected_heart_rate(&sim).await;
        let location = testing::characteristic(&device, HEART_RATE_SERVICE, BODY_SENSOR_LOCATION).await;
        sim.set_auto_respond(false);

        let first = {
            let location = location.clone();
            tokio::spawn(async move { location.read(&CancellationToken::new()).await })
        };
        let second = {
            let location = location.clone();
            tokio::spawn(async move { location.read(&CancellationToken::new()).await })
        };
        while sim.count(|c| matches!(c, BridgeCall::ReadCharacteristic(_))) == 0
            || location.scope.ctx().queue.is_empty()
        {
            tokio::task::yield_now().await;
        }
        sim.drop_link(device.id());

        let lost = Err(BleError::ConnectionLost(device.id()));
        assert_eq!(first.await.expect("first"), lost);
        assert_eq!(second.await.expect("second"), lost);
        assert_eq!(sim.count(|c| matches!(c, BridgeCall::ReadCharacteristic(_))), 1);
    }

    #[test]
    fn test_string_value_is_utf8() {
        let characteristic = offline(CharacteristicProperties::READ);
        *characteristic.value.write() = b"Polar H10".to_vec();
        assert_eq!(characteristic.string_value(), "Polar H10");
    }
}
