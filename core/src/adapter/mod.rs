/// Adapter state machine
///
/// Scan lifecycle (`Idle` / `Scanning`), discovered and connected device
/// registries, and connect/disconnect orchestration.
pub mod events;
pub mod manager;
pub mod scan;

pub use events::AdapterEvent;
pub use manager::Adapter;
pub use scan::{DeviceFilter, ScanMode, ScanOptions};
