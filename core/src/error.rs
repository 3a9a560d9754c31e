//! Error taxonomy shared by every layer of the central stack.

use crate::device::DeviceId;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BleError {
    /// Operation not allowed given the current capability or state. Raised
    /// before any native call is issued.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// The device holds no live native handle.
    #[error("Device {0} is not connected")]
    NotConnected(DeviceId),
    /// Another connect/disconnect for the same device is already in flight.
    #[error("Connection transition already in progress for device {0}")]
    TransitionInProgress(DeviceId),
    #[error("Connection to device {id} failed: {message}")]
    Connection { id: DeviceId, message: String },
    #[error("Connection to device {0} was lost")]
    ConnectionLost(DeviceId),
    #[error("Disconnect from device {id} failed: {message}")]
    Disconnect { id: DeviceId, message: String },
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Operation not supported: {0}")]
    Unsupported(String),
    #[error("Native stack error: {0}")]
    Native(String),
    #[error("Bluetooth LE is unavailable on this device")]
    Unavailable,
}

impl BleError {
    /// True for failures raised synchronously without touching the native stack.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BleError::Validation(_) | BleError::NotConnected(_) | BleError::TransitionInProgress(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        let id = DeviceId::from_address([0, 1, 2, 3, 4, 5]);
        assert!(BleError::Validation("no".into()).is_validation());
        assert!(BleError::NotConnected(id).is_validation());
        assert!(BleError::TransitionInProgress(id).is_validation());
        assert!(!BleError::ConnectionLost(id).is_validation());
        assert!(!BleError::Cancelled.is_validation());
    }

    #[test]
    fn test_connection_error_carries_identity() {
        let id = DeviceId::from_address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        let err = BleError::Connection {
            id,
            message: "status 133".into(),
        };
        assert_eq!(
            err.to_string(),
            "Connection to device AA:BB:CC:DD:EE:FF failed: status 133"
        );
    }
}
