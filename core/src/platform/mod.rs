//! Native collaborator boundary
//!
//! Host stacks implement [`BlePlatformBridge`] for outgoing requests and push
//! completions back through an [`EventSink`]. Two implementations ship with
//! the crate: [`UnavailableBridge`] for hosts without Bluetooth LE and
//! [`SimulatedBridge`] for tests and hardware-free demos.

pub mod bridge;
pub mod event;
pub mod simulated;
pub mod sink;
pub mod unavailable;

pub use bridge::{BlePlatformBridge, ConnectParameters, ConnectionInterval, SystemDevice};
pub use event::NativeEvent;
pub use simulated::{
    BridgeCall, SimulatedBridge, SimulatedCharacteristic, SimulatedPeripheral, SimulatedService,
};
pub use sink::EventSink;
pub use unavailable::UnavailableBridge;

#[cfg(test)]
pub use bridge::MockBlePlatformBridge;
