//! Device lifecycle: identity, cached GATT hierarchy, cancellation epoch and
//! the connection-dependent request/response operations.

use crate::context::BleContext;
use crate::device::{AdvertisementRecord, DeviceId, LinkHandle, LinkScope};
use crate::error::BleError;
use crate::gatt::Service;
use crate::platform::{ConnectionInterval, NativeEvent};
use crate::sync::Epoch;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    Disconnected,
    Connecting,
    Connected,
    /// Connected to the host by someone else; no link in this process.
    Limited,
}

struct DeviceInfo {
    name: Option<String>,
    rssi: i32,
    advertisement: Vec<AdvertisementRecord>,
    state: DeviceState,
    link: Option<LinkHandle>,
}

struct GattCache {
    epoch: Epoch,
    services: Option<Vec<Arc<Service>>>,
    /// Generation that ended because the link dropped unexpectedly.
    lost_generation: Option<u64>,
}

/// A remote peripheral.
///
/// One `Device` exists per identity while anything references it. Equality
/// and hashing use the identity only.
pub struct Device {
    id: DeviceId,
    ctx: Arc<BleContext>,
    this: Weak<Device>,
    info: RwLock<DeviceInfo>,
    gatt: Mutex<GattCache>,
    discovery: tokio::sync::Mutex<()>,
    transition: AtomicBool,
}

impl Device {
    pub(crate) fn new(id: DeviceId, ctx: Arc<BleContext>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id,
            ctx,
            this: this.clone(),
            info: RwLock::new(DeviceInfo {
                name: None,
                rssi: 0,
                advertisement: Vec::new(),
                state: DeviceState::Disconnected,
                link: None,
            }),
            gatt: Mutex::new(GattCache {
                epoch: Epoch::new(),
                services: None,
                lost_generation: None,
            }),
            discovery: tokio::sync::Mutex::new(()),
            transition: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> Option<String> {
        self.info.read().name.clone()
    }

    /// Last known signal strength in dBm.
    pub fn rssi(&self) -> i32 {
        self.info.read().rssi
    }

    pub fn state(&self) -> DeviceState {
        self.info.read().state
    }

    pub fn advertisement_records(&self) -> Vec<AdvertisementRecord> {
        self.info.read().advertisement.clone()
    }

    pub fn link(&self) -> Option<LinkHandle> {
        self.info.read().link
    }

    /// Whether the device holds a live native handle.
    pub fn has_link(&self) -> bool {
        self.info.read().link.is_some()
    }

    // ------------------------------------------------------------------------
    // GATT hierarchy
    // ------------------------------------------------------------------------

    /// Services of the connected device. The first call per epoch runs
    /// native discovery; later calls are served from the cache.
    pub async fn services(&self, token: &CancellationToken) -> Result<Vec<Arc<Service>>, BleError> {
        if let Some(cached) = self.cached_services() {
            return Ok(cached);
        }

        let _round = self.discovery.lock().await;
        if let Some(cached) = self.cached_services() {
            return Ok(cached);
        }

        let scope = self.scope();
        let id = self.id;
        let discovered = scope
            .request(
                token,
                move |bridge| bridge.discover_services(id),
                move |event| match event {
                    NativeEvent::ServicesDiscovered { id: from, result } if *from == id => {
                        Some(result.clone().map_err(BleError::Native))
                    }
                    _ => None,
                },
            )
            .await?;

        let services: Vec<Arc<Service>> = discovered
            .into_iter()
            .map(|info| Service::new(info, scope.clone()))
            .collect();

        let mut gatt = self.gatt.lock();
        if gatt.epoch.generation() != scope.generation() {
            debug!("Discarding services of {}: epoch ended during discovery", self.id);
            return Err(BleError::Cancelled);
        }
        gatt.services = Some(services.clone());
        debug!("Cached {} services for {}", services.len(), self.id);
        Ok(services)
    }

    pub async fn service(
        &self,
        id: Uuid,
        token: &CancellationToken,
    ) -> Result<Option<Arc<Service>>, BleError> {
        let services = self.services(token).await?;
        Ok(services.into_iter().find(|service| service.id() == id))
    }

    /// End the current epoch and drop the cached hierarchy. Waits tied to
    /// the old epoch are cancelled; the next [`Device::services`] call runs
    /// a fresh discovery round.
    pub fn clear_services(&self) {
        self.end_epoch(false);
    }

    fn end_epoch(&self, link_lost: bool) {
        let disposed = {
            let mut gatt = self.gatt.lock();
            if link_lost {
                gatt.lost_generation = Some(gatt.epoch.generation());
            }
            gatt.epoch.advance();
            gatt.services.take()
        };

        if let Some(services) = disposed {
            debug!("Disposing {} cached services of {}", services.len(), self.id);
            for service in services {
                service.dispose();
            }
        }
    }

    fn cached_services(&self) -> Option<Vec<Arc<Service>>> {
        self.gatt.lock().services.clone()
    }

    fn scope(&self) -> LinkScope {
        let gatt = self.gatt.lock();
        LinkScope::new(
            Arc::clone(&self.ctx),
            self.this.clone(),
            self.id,
            gatt.epoch.generation(),
            gatt.epoch.token(),
        )
    }

    // ------------------------------------------------------------------------
    // Link operations
    // ------------------------------------------------------------------------

    /// Read the signal strength of the live link.
    pub async fn update_rssi(&self, token: &CancellationToken) -> Result<i32, BleError> {
        let id = self.id;
        let rssi = self
            .scope()
            .request(
                token,
                move |bridge| bridge.read_rssi(id),
                move |event| match event {
                    NativeEvent::RssiRead { id: from, result } if *from == id => {
                        Some(result.clone().map_err(BleError::Native))
                    }
                    _ => None,
                },
            )
            .await?;
        self.info.write().rssi = rssi;
        Ok(rssi)
    }

    /// Negotiate a new MTU. Resolves with the MTU the peripheral agreed to.
    pub async fn request_mtu(&self, mtu: u16, token: &CancellationToken) -> Result<u16, BleError> {
        let id = self.id;
        self.scope()
            .request(
                token,
                move |bridge| bridge.request_mtu(id, mtu),
                move |event| match event {
                    NativeEvent::MtuChanged { id: from, result } if *from == id => {
                        Some(result.clone().map_err(BleError::Native))
                    }
                    _ => None,
                },
            )
            .await
    }

    /// Ask the host for a different connection interval class.
    pub fn update_connection_interval(&self, interval: ConnectionInterval) -> Result<bool, BleError> {
        if !self.has_link() {
            return Err(BleError::NotConnected(self.id));
        }
        self.ctx.bridge.update_connection_interval(self.id, interval)
    }

    // ------------------------------------------------------------------------
    // Lifecycle hooks driven by the adapter
    // ------------------------------------------------------------------------

    /// Swap the native handle. Identity is untouched.
    pub(crate) fn update(&self, link: Option<LinkHandle>, name: Option<String>) {
        let mut info = self.info.write();
        if name.is_some() {
            info.name = name;
        }
        info.state = if link.is_some() {
            DeviceState::Connected
        } else {
            DeviceState::Disconnected
        };
        info.link = link;
    }

    pub(crate) fn apply_advertisement(
        &self,
        name: Option<String>,
        rssi: i32,
        advertisement: Vec<AdvertisementRecord>,
    ) {
        let mut info = self.info.write();
        if name.is_some() {
            info.name = name;
        }
        info.rssi = rssi;
        info.advertisement = advertisement;
    }

    pub(crate) fn set_state(&self, state: DeviceState) {
        self.info.write().state = state;
    }

    /// Apply a host report of a paired or already-connected device. A
    /// device connected to the host without a link of our own is `Limited`.
    pub(crate) fn apply_system_report(&self, name: Option<String>, connected: bool) {
        let mut info = self.info.write();
        if name.is_some() {
            info.name = name;
        }
        if info.link.is_none() && info.state != DeviceState::Connecting {
            info.state = if connected {
                DeviceState::Limited
            } else {
                DeviceState::Disconnected
            };
        }
    }

    /// Drop the native handle and invalidate the GATT hierarchy.
    pub(crate) fn detach(&self, link_lost: bool) {
        self.update(None, None);
        self.end_epoch(link_lost);
        info!("Device {} detached (link lost: {})", self.id, link_lost);
    }

    pub(crate) fn lost_generation(&self) -> Option<u64> {
        self.gatt.lock().lost_generation
    }

    pub(crate) fn begin_transition(&self) -> Result<TransitionGuard<'_>, BleError> {
        self.transition
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BleError::TransitionInProgress(self.id))?;
        Ok(TransitionGuard {
            flag: &self.transition,
        })
    }
}

/// Marks a connect or disconnect in flight; released on drop.
pub(crate) struct TransitionGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info.read();
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &info.name)
            .field("state", &info.state)
            .field("rssi", &info.rssi)
            .finish()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BleSettings;
    use crate::platform::{BridgeCall, MockBlePlatformBridge, SimulatedBridge};
    use crate::testing::{self, HEART_RATE_SERVICE};
    use proptest::prelude::*;

    fn detached_device(bridge: MockBlePlatformBridge) -> Arc<Device> {
        let ctx = BleContext::new(Arc::new(bridge), BleSettings::default());
        Device::new(DeviceId::from_address([0xC0, 0xFF, 0xEE, 0, 0, 1]), ctx)
    }

    proptest! {
        #[test]
        fn test_identity_survives_handle_swaps(swaps in proptest::collection::vec(proptest::option::of(any::<u64>()), 0..32)) {
            let device = detached_device(MockBlePlatformBridge::new());
            let id = device.id();
            for swap in swaps {
                device.update(swap.map(LinkHandle::new), Some("renamed".into()));
                prop_assert_eq!(device.id(), id);
                prop_assert_eq!(device.has_link(), swap.is_some());
            }
        }
    }

    #[tokio::test]
    async fn test_link_operations_fail_fast_without_handle() {
        // No expectations: any native call would panic.
        let device = detached_device(MockBlePlatformBridge::new());
        let token = CancellationToken::new();

        assert_eq!(
            device.update_rssi(&token).await,
            Err(BleError::NotConnected(device.id()))
        );
        assert_eq!(
            device.request_mtu(185, &token).await,
            Err(BleError::NotConnected(device.id()))
        );
        assert_eq!(
            device.update_connection_interval(ConnectionInterval::High),
            Err(BleError::NotConnected(device.id()))
        );
        assert!(device.services(&token).await.is_err());
    }

    #[test]
    fn test_equality_is_identity_only() {
        let a = detached_device(MockBlePlatformBridge::new());
        let b = detached_device(MockBlePlatformBridge::new());
        b.update(Some(LinkHandle::new(9)), Some("other".into()));
        assert_eq!(*a, *b);
    }

    #[test]
    fn test_second_transition_rejected_until_first_ends() {
        let device = detached_device(MockBlePlatformBridge::new());
        let guard = device.begin_transition().expect("first transition");
        assert_eq!(
            device.begin_transition().err(),
            Some(BleError::TransitionInProgress(device.id()))
        );
        drop(guard);
        assert!(device.begin_transition().is_ok());
    }

    #[tokio::test]
    async fn test_services_are_memoized() {
        let sim = SimulatedBridge::new();
        let (_adapter, device) = testing::connected_heart_rate(&sim).await;
        let token = CancellationToken::new();

        let first = device.services(&token).await.expect("discovery");
        let second = device.services(&token).await.expect("cache hit");

        assert_eq!(sim.count(|c| matches!(c, BridgeCall::DiscoverServices(_))), 1);
        assert_eq!(first.len(), second.len());
        assert!(Arc::ptr_eq(&first[0], &second[0]));
    }

    #[tokio::test]
    async fn test_clear_services_forces_one_new_round() {
        let sim = SimulatedBridge::new();
        let (_adapter, device) = testing::connected_heart_rate(&sim).await;
        let token = CancellationToken::new();

        let before = device
            .service(HEART_RATE_SERVICE, &token)
            .await
            .expect("discovery")
            .expect("heart rate service");
        device.clear_services();
        let after = device
            .service(HEART_RATE_SERVICE, &token)
            .await
            .expect("rediscovery")
            .expect("heart rate service");
        let _ = device.services(&token).await.expect("cache hit");

        assert_eq!(sim.count(|c| matches!(c, BridgeCall::DiscoverServices(_))), 2);
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(before.is_stale());
        assert!(!after.is_stale());
    }

    #[tokio::test]
    async fn test_rssi_read_updates_cached_value() {
        let sim = SimulatedBridge::new();
        let (_adapter, device) = testing::connected_heart_rate(&sim).await;

        let rssi = device
            .update_rssi(&CancellationToken::new())
            .await
            .expect("rssi");
        assert_eq!(rssi, -48);
        assert_eq!(device.rssi(), -48);
    }

    #[tokio::test]
    async fn test_mtu_negotiation_and_unsupported_sentinel() {
        let sim = SimulatedBridge::new();
        let (_adapter, device) = testing::connected_heart_rate(&sim).await;
        let token = CancellationToken::new();

        assert_eq!(device.request_mtu(512, &token).await, Ok(247));

        sim.set_mtu_supported(false);
        assert!(matches!(
            device.request_mtu(512, &token).await,
            Err(BleError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_interval_reaches_host() {
        let sim = SimulatedBridge::new();
        let (_adapter, device) = testing::connected_heart_rate(&sim).await;

        assert_eq!(device.update_connection_interval(ConnectionInterval::Low), Ok(true));
        assert_eq!(
            sim.count(|c| matches!(c, BridgeCall::UpdateConnectionInterval { .. })),
            1
        );
    }
}
