// Implementation root
//
// `BluetoothLe` is the one explicitly initialized context object: it owns
// the platform bridge, tracks availability and power state, and lazily
// creates the adapter every other operation hangs off.

use crate::adapter::Adapter;
use crate::config::{BleSettings, SettingsError};
use crate::platform::{BlePlatformBridge, EventSink, NativeEvent, UnavailableBridge};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::watch;
use tracing::{info, warn};

static CURRENT: OnceLock<Arc<BluetoothLe>> = OnceLock::new();

/// Availability and power state of the host radio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BluetoothState {
    #[default]
    Unknown,
    /// The host has no Bluetooth LE support at all.
    Unavailable,
    Unauthorized,
    TurningOn,
    On,
    TurningOff,
    Off,
}

// ============================================================================
// ROOT
// ============================================================================

pub struct BluetoothLe {
    bridge: Arc<dyn BlePlatformBridge>,
    settings: BleSettings,
    state: watch::Sender<BluetoothState>,
    adapter: OnceLock<Arc<Adapter>>,
    this: Weak<BluetoothLe>,
}

impl BluetoothLe {
    pub fn new(
        bridge: Arc<dyn BlePlatformBridge>,
        settings: BleSettings,
    ) -> Result<Arc<Self>, SettingsError> {
        settings.validate()?;
        let (state, _) = watch::channel(BluetoothState::Unknown);
        Ok(Arc::new_cyclic(|this| Self {
            bridge,
            settings,
            state,
            adapter: OnceLock::new(),
            this: this.clone(),
        }))
    }

    /// Query the host for its current state. Call once the platform side is
    /// wired up; later changes arrive as `NativeEvent::StateChanged`.
    pub fn initialize(&self) {
        let state = self.bridge.initial_state();
        info!("Bluetooth LE initialized, host state {:?}", state);
        self.state.send_replace(state);
    }

    pub fn state(&self) -> BluetoothState {
        *self.state.borrow()
    }

    pub fn is_available(&self) -> bool {
        self.state() != BluetoothState::Unavailable
    }

    pub fn is_on(&self) -> bool {
        self.state() == BluetoothState::On
    }

    pub fn state_changes(&self) -> watch::Receiver<BluetoothState> {
        self.state.subscribe()
    }

    pub fn settings(&self) -> &BleSettings {
        &self.settings
    }

    /// The adapter, created on first use. Hosts that reported `Unavailable`
    /// get an adapter whose every native operation is refused. The host is
    /// queried first if [`BluetoothLe::initialize`] has not run yet.
    pub fn adapter(&self) -> Arc<Adapter> {
        let adapter = self.adapter.get_or_init(|| {
            if self.state() == BluetoothState::Unknown {
                self.initialize();
            }
            let bridge: Arc<dyn BlePlatformBridge> = if self.is_available() {
                Arc::clone(&self.bridge)
            } else {
                warn!("Bluetooth LE unavailable, adapter operations will be refused");
                Arc::new(UnavailableBridge)
            };
            Adapter::new(bridge, self.settings.clone())
        });
        Arc::clone(adapter)
    }

    /// Sink the platform feeds every notification into, state changes
    /// included.
    pub fn sink(&self) -> EventSink {
        EventSink::for_root(self.this.clone())
    }

    pub(crate) fn notify(&self, event: NativeEvent) {
        match event {
            NativeEvent::StateChanged(state) => {
                let previous = self.state.send_replace(state);
                if previous != state {
                    info!("Bluetooth state {:?} -> {:?}", previous, state);
                }
            }
            other => self.adapter().notify(other),
        }
    }

    // ------------------------------------------------------------------------
    // Process-wide instance
    // ------------------------------------------------------------------------

    /// Make `root` the current instance. Fails if one is already installed.
    pub fn install(root: Arc<BluetoothLe>) -> Result<(), Arc<BluetoothLe>> {
        CURRENT.set(root)
    }

    pub fn current() -> Option<Arc<BluetoothLe>> {
        CURRENT.get().cloned()
    }
}

impl fmt::Debug for BluetoothLe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BluetoothLe")
            .field("state", &self.state())
            .field("adapter", &self.adapter.get().is_some())
            .finish()
    }
}
