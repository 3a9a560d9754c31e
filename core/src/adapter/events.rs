use crate::device::Device;
use std::sync::Arc;

/// Notifications raised by the adapter to application code.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// A filtered-in advertisement. Raised for every advertisement.
    DeviceAdvertised(Arc<Device>),
    /// First advertisement of a device during the current scan run.
    DeviceDiscovered(Arc<Device>),
    DeviceConnected(Arc<Device>),
    /// Disconnect requested by this process.
    DeviceDisconnected(Arc<Device>),
    /// Link dropped without being asked to.
    DeviceConnectionLost(Arc<Device>),
    /// A connect attempt failed.
    DeviceConnectionError { device: Arc<Device>, message: String },
    /// The internal scan timer stopped the scan.
    ScanTimeoutElapsed,
}

impl AdapterEvent {
    pub fn device(&self) -> Option<&Arc<Device>> {
        match self {
            AdapterEvent::DeviceAdvertised(device)
            | AdapterEvent::DeviceDiscovered(device)
            | AdapterEvent::DeviceConnected(device)
            | AdapterEvent::DeviceDisconnected(device)
            | AdapterEvent::DeviceConnectionLost(device)
            | AdapterEvent::DeviceConnectionError { device, .. } => Some(device),
            AdapterEvent::ScanTimeoutElapsed => None,
        }
    }
}
