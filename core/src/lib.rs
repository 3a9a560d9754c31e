// Gattlink Core: BLE central session layer
//
// Scanning, connection orchestration and GATT operations over one async
// contract. Everything platform-specific sits behind `BlePlatformBridge`.

//! Platform-independent core of a Bluetooth LE central.
//!
//! Start from [`BluetoothLe`]: give it a [`BlePlatformBridge`] for the host
//! stack, feed the host's callbacks into [`BluetoothLe::sink`], then drive
//! scanning and connections through [`BluetoothLe::adapter`]. GATT objects
//! hang off the connected [`Device`].
//!
//! Every native request/response operation is serialized through a single
//! command queue, carries a timeout, and can be cancelled with a
//! [`CancellationToken`].

pub mod adapter;
pub mod ble;
pub mod config;
pub(crate) mod context;
pub mod device;
pub mod error;
pub mod gatt;
pub mod platform;
pub mod sync;

#[cfg(test)]
mod testing;

pub use adapter::{Adapter, AdapterEvent, DeviceFilter, ScanMode, ScanOptions};
pub use ble::{BluetoothLe, BluetoothState};
pub use config::{BleSettings, SettingsError};
pub use device::{AdvertisementRecord, AdvertisementRecordType, Device, DeviceId, DeviceState};
pub use error::BleError;
pub use gatt::{
    Characteristic, CharacteristicProperties, CharacteristicRef, Descriptor, DescriptorRef,
    Service, ServiceRef, WriteType,
};
pub use platform::{
    BlePlatformBridge, ConnectParameters, ConnectionInterval, EventSink, NativeEvent,
    SimulatedBridge, UnavailableBridge,
};
pub use tokio_util::sync::CancellationToken;

// ============================================================================
// LOGGING
// ============================================================================

/// Install a `tracing` subscriber honouring `RUST_LOG` (default `info`).
/// Safe to call more than once; only the first call installs anything.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
