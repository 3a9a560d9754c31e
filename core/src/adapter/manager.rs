// Adapter state machine
//
// Owns the scan lifecycle, the discovered and connected device registries,
// and connect/disconnect orchestration. Native notifications enter through
// `Adapter::notify` (usually via an `EventSink`) from any thread; every
// registry read-modify-write happens under the registry lock, and no lock is
// ever held while calling into the platform bridge.

use crate::adapter::{AdapterEvent, DeviceFilter, ScanMode, ScanOptions};
use crate::config::BleSettings;
use crate::context::BleContext;
use crate::device::{AdvertisementRecord, Device, DeviceId, DeviceState, LinkHandle};
use crate::error::BleError;
use crate::platform::{BlePlatformBridge, ConnectParameters, EventSink, NativeEvent};
use crate::sync::from_event;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

// ============================================================================
// STATE MANAGEMENT
// ============================================================================

struct ActiveScan {
    run: u64,
    stop: CancellationToken,
    filter: Option<DeviceFilter>,
}

#[derive(Default)]
struct ScanState {
    next_run: u64,
    active: Option<ActiveScan>,
}

#[derive(Default)]
struct Registry {
    /// Every device object handed out, so one identity maps to one object.
    known: HashMap<DeviceId, Weak<Device>>,
    /// Devices seen during the current scan run, in discovery order.
    discovered: Vec<Arc<Device>>,
    /// Devices holding a live native handle.
    connected: HashMap<DeviceId, Arc<Device>>,
}

impl Registry {
    fn lookup(&self, id: DeviceId) -> Option<Arc<Device>> {
        self.known.get(&id).and_then(Weak::upgrade)
    }

    fn remember(&mut self, device: &Arc<Device>) {
        self.known.retain(|_, weak| weak.strong_count() > 0);
        self.known.insert(device.id(), Arc::downgrade(device));
    }
}

struct ScanTuning {
    timeout: Duration,
    mode: ScanMode,
}

// ============================================================================
// ADAPTER
// ============================================================================

pub struct Adapter {
    ctx: Arc<BleContext>,
    this: Weak<Adapter>,
    events: broadcast::Sender<AdapterEvent>,
    scan: Mutex<ScanState>,
    tuning: RwLock<ScanTuning>,
    registry: Mutex<Registry>,
    next_link: AtomicU64,
}

impl Adapter {
    pub fn new(bridge: Arc<dyn BlePlatformBridge>, settings: BleSettings) -> Arc<Self> {
        let (events, _) = broadcast::channel(settings.event_channel_capacity.max(1));
        let tuning = ScanTuning {
            timeout: settings.scan_timeout(),
            mode: settings.scan_mode,
        };
        let ctx = BleContext::new(bridge, settings);
        Arc::new_cyclic(|this| Self {
            ctx,
            this: this.clone(),
            events,
            scan: Mutex::new(ScanState::default()),
            tuning: RwLock::new(tuning),
            registry: Mutex::new(Registry::default()),
            next_link: AtomicU64::new(1),
        })
    }

    /// Sink the platform uses to feed notifications into this adapter.
    pub fn sink(&self) -> EventSink {
        EventSink::for_adapter(self.this.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.lock().active.is_some()
    }

    pub fn scan_timeout(&self) -> Duration {
        self.tuning.read().timeout
    }

    /// Applies to the next scan run.
    pub fn set_scan_timeout(&self, timeout: Duration) {
        self.tuning.write().timeout = timeout;
    }

    pub fn scan_mode(&self) -> ScanMode {
        self.tuning.read().mode
    }

    pub fn set_scan_mode(&self, mode: ScanMode) {
        self.tuning.write().mode = mode;
    }

    pub fn discovered_devices(&self) -> Vec<Arc<Device>> {
        self.registry.lock().discovered.clone()
    }

    pub fn connected_devices(&self) -> Vec<Arc<Device>> {
        self.registry.lock().connected.values().cloned().collect()
    }

    /// The device object for `id`, if one is currently alive.
    pub fn device(&self, id: DeviceId) -> Option<Arc<Device>> {
        self.registry.lock().lookup(id)
    }

    /// Abort GATT commands still waiting in the shared queue.
    pub fn cancel_pending_commands(&self) -> usize {
        self.ctx.queue.cancel_pending()
    }

    // ------------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------------

    /// Scan until the scan timeout elapses, `token` is cancelled or
    /// [`Adapter::stop_scanning`] is called.
    ///
    /// Returns true immediately if a scan is already running, and false if
    /// the native scanner refused to start.
    pub async fn start_scanning(&self, options: ScanOptions, token: &CancellationToken) -> bool {
        let (run, stop) = {
            let mut scan = self.scan.lock();
            if scan.active.is_some() {
                debug!("Scan already running");
                return true;
            }
            let run = scan.next_run;
            scan.next_run += 1;
            let stop = CancellationToken::new();
            scan.active = Some(ActiveScan {
                run,
                stop: stop.clone(),
                filter: options.device_filter.clone(),
            });
            (run, stop)
        };

        self.registry.lock().discovered.clear();

        let mode = self.scan_mode();
        info!(
            "Starting scan #{} ({:?}, {} service filters)",
            run,
            mode,
            options.service_uuids.len()
        );
        if !self
            .ctx
            .bridge
            .start_scan(&options.service_uuids, options.allow_duplicates, mode)
        {
            warn!("Native scanner failed to start");
            let mut scan = self.scan.lock();
            if scan.active.as_ref().map(|a| a.run) == Some(run) {
                scan.active = None;
            }
            return false;
        }

        let guard = ScanGuard { adapter: self, run };
        let timeout = self.scan_timeout();
        let elapsed = tokio::select! {
            _ = tokio::time::sleep(timeout) => true,
            _ = stop.cancelled() => false,
            _ = token.cancelled() => false,
        };
        drop(guard);

        if elapsed {
            info!("Scan #{} timed out after {:?}", run, timeout);
            self.emit(AdapterEvent::ScanTimeoutElapsed);
        }
        true
    }

    /// Stop the running scan, if any, and return to idle.
    pub fn stop_scanning(&self) {
        let run = self.scan.lock().active.as_ref().map(|a| a.run);
        if let Some(run) = run {
            self.finish_scan(run);
        }
    }

    fn finish_scan(&self, run: u64) {
        let finished = {
            let mut scan = self.scan.lock();
            if scan.active.as_ref().map(|a| a.run) == Some(run) {
                scan.active.take()
            } else {
                None
            }
        };

        if let Some(active) = finished {
            active.stop.cancel();
            self.ctx.bridge.stop_scan();
            info!("Scan #{} stopped", run);
        }
    }

    fn handle_discovered(
        &self,
        id: DeviceId,
        name: Option<String>,
        rssi: i32,
        advertisement: Vec<AdvertisementRecord>,
    ) {
        let filter = match self.scan.lock().active.as_ref() {
            Some(active) => active.filter.clone(),
            None => {
                trace!("Ignoring advertisement from {} while idle", id);
                return;
            }
        };

        let device = self.device_for(id);
        device.apply_advertisement(name, rssi, advertisement);

        if let Some(filter) = filter {
            if !filter(&device) {
                trace!("Advertisement from {} rejected by filter", id);
                return;
            }
        }

        self.emit(AdapterEvent::DeviceAdvertised(Arc::clone(&device)));

        let first_sighting = {
            let mut registry = self.registry.lock();
            if registry.discovered.iter().any(|d| d.id() == id) {
                false
            } else {
                registry.discovered.push(Arc::clone(&device));
                true
            }
        };
        if first_sighting {
            debug!("Discovered {}", device);
            self.emit(AdapterEvent::DeviceDiscovered(device));
        }
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    /// Connect to `device`. Succeeds immediately if it is already connected.
    /// Cancelling `token` abandons the wait and asks the host to abort the
    /// native attempt.
    pub async fn connect(
        &self,
        device: &Arc<Device>,
        parameters: ConnectParameters,
        token: &CancellationToken,
    ) -> Result<(), BleError> {
        let id = device.id();
        if device.has_link() && self.is_registered(id) {
            debug!("{} already connected", device);
            return Ok(());
        }

        if token.is_cancelled() {
            return Err(BleError::Cancelled);
        }

        let _transition = device.begin_transition()?;
        self.registry.lock().remember(device);
        device.set_state(DeviceState::Connecting);
        info!("Connecting to {} ({:?})", device, parameters);

        let bridge = Arc::clone(&self.ctx.bridge);
        let issued = AtomicBool::new(false);
        let result = from_event(
            &self.ctx.hub,
            token.clone().cancelled_owned(),
            || {
                issued.store(true, Ordering::Release);
                bridge.connect(id, parameters)
            },
            move |event| match event {
                NativeEvent::DeviceConnected { id: from, .. } if *from == id => Some(Ok(())),
                NativeEvent::DeviceConnectionFailed { id: from, message } if *from == id => {
                    Some(Err(BleError::Connection {
                        id,
                        message: message.clone(),
                    }))
                }
                _ => None,
            },
        )
        .await;

        if let Err(err) = &result {
            if *err == BleError::Cancelled {
                info!("Connect to {} cancelled", id);
                if issued.load(Ordering::Acquire) {
                    self.ctx.bridge.cancel_connect(id);
                }
            }
            if !self.is_registered(id) {
                device.set_state(DeviceState::Disconnected);
            }
        }
        result
    }

    /// Disconnect from `device`. Does nothing if it is not connected.
    pub async fn disconnect(&self, device: &Arc<Device>) -> Result<(), BleError> {
        let id = device.id();
        if !self.is_registered(id) {
            debug!("{} is not connected, nothing to disconnect", id);
            return Ok(());
        }

        let _transition = device.begin_transition()?;
        info!("Disconnecting from {}", device);
        device.clear_services();

        let bridge = Arc::clone(&self.ctx.bridge);
        let timeout = self.ctx.settings.disconnect_timeout();
        let wait = from_event(
            &self.ctx.hub,
            std::future::pending(),
            move || bridge.disconnect(id),
            move |event| match event {
                NativeEvent::DeviceDisconnected { id: from, .. } if *from == id => Some(Ok(())),
                NativeEvent::DeviceConnectionFailed { id: from, message } if *from == id => {
                    Some(Err(BleError::Disconnect {
                        id,
                        message: message.clone(),
                    }))
                }
                _ => None,
            },
        );

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Timed out waiting for {} to disconnect", id);
                Err(BleError::Timeout(timeout))
            }
        }
    }

    /// Connect to a device by identity without scanning for it first.
    pub async fn connect_to_known(
        &self,
        id: DeviceId,
        parameters: ConnectParameters,
        token: &CancellationToken,
    ) -> Result<Arc<Device>, BleError> {
        let device = self.device_for(id);
        self.connect(&device, parameters, token).await?;
        Ok(device)
    }

    /// Devices the host reports as connected (by any process) or paired,
    /// optionally restricted to those exposing one of `service_uuids`.
    pub fn system_connected_or_paired_devices(&self, service_uuids: &[Uuid]) -> Vec<Arc<Device>> {
        self.ctx
            .bridge
            .system_devices(service_uuids)
            .into_iter()
            .map(|report| {
                let device = self.device_for(report.id);
                device.apply_system_report(report.name, report.connected);
                device
            })
            .collect()
    }

    fn is_registered(&self, id: DeviceId) -> bool {
        self.registry.lock().connected.contains_key(&id)
    }

    fn device_for(&self, id: DeviceId) -> Arc<Device> {
        let mut registry = self.registry.lock();
        if let Some(device) = registry.lookup(id) {
            return device;
        }
        let device = Device::new(id, Arc::clone(&self.ctx));
        registry.remember(&device);
        device
    }

    // ------------------------------------------------------------------------
    // Notification surface
    // ------------------------------------------------------------------------

    /// Feed one native notification into the adapter.
    ///
    /// Registries are updated before waiters are released, except on link
    /// loss, where pending waits are rejected first so they observe the loss
    /// rather than a plain cancellation.
    pub fn notify(&self, event: NativeEvent) {
        match &event {
            NativeEvent::StateChanged(state) => {
                debug!("Adapter saw state change to {:?}", state);
            }
            NativeEvent::DeviceDiscovered {
                id,
                name,
                rssi,
                advertisement,
            } => self.handle_discovered(*id, name.clone(), *rssi, advertisement.clone()),
            NativeEvent::DeviceConnected { id, name } => self.handle_connected(*id, name.clone()),
            NativeEvent::DeviceConnectionFailed { id, message } => {
                self.handle_connection_failed(*id, message.clone())
            }
            NativeEvent::DeviceDisconnected { id, user_requested } => {
                self.handle_disconnected(*id, *user_requested, &event);
                return;
            }
            _ => {}
        }
        self.ctx.hub.publish(&event);
    }

    fn handle_connected(&self, id: DeviceId, name: Option<String>) {
        let device = self.device_for(id);
        let link = LinkHandle::new(self.next_link.fetch_add(1, Ordering::Relaxed));
        device.update(Some(link), name);

        let newly_connected = self
            .registry
            .lock()
            .connected
            .insert(id, Arc::clone(&device))
            .is_none();
        if newly_connected {
            info!("Connected to {}", device);
            self.emit(AdapterEvent::DeviceConnected(device));
        } else {
            debug!("Native handle for {} swapped", device);
        }
    }

    fn handle_connection_failed(&self, id: DeviceId, message: String) {
        let device = self.device_for(id);
        if !self.is_registered(id) {
            device.set_state(DeviceState::Disconnected);
        }
        warn!("Connection to {} failed: {}", device, message);
        self.emit(AdapterEvent::DeviceConnectionError { device, message });
    }

    fn handle_disconnected(&self, id: DeviceId, user_requested: bool, event: &NativeEvent) {
        let device = self.registry.lock().lookup(id);
        let Some(device) = device else {
            debug!("Disconnect reported for unknown device {}", id);
            self.ctx.hub.publish(event);
            return;
        };

        if device.state() == DeviceState::Connecting && !self.is_registered(id) {
            let message = "disconnected before the connection was established".to_string();
            self.handle_connection_failed(id, message.clone());
            self.ctx
                .hub
                .publish(&NativeEvent::DeviceConnectionFailed { id, message });
            return;
        }

        let was_connected = self.registry.lock().connected.remove(&id).is_some();
        if user_requested {
            device.detach(false);
            self.ctx.hub.publish(event);
            if was_connected {
                info!("Disconnected from {}", device);
                self.emit(AdapterEvent::DeviceDisconnected(device));
            }
        } else {
            self.ctx.hub.publish(event);
            self.registry.lock().discovered.retain(|d| d.id() != id);
            device.detach(true);
            if was_connected {
                warn!("Connection to {} lost", device);
                self.emit(AdapterEvent::DeviceConnectionLost(device));
            }
        }
    }

    fn emit(&self, event: AdapterEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("Adapter")
            .field("scanning", &self.is_scanning())
            .field("discovered", &registry.discovered.len())
            .field("connected", &registry.connected.len())
            .finish()
    }
}

/// Returns the adapter to idle when a scan run ends, including when the
/// `start_scanning` future is dropped.
struct ScanGuard<'a> {
    adapter: &'a Adapter,
    run: u64,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.adapter.finish_scan(self.run);
    }
}
