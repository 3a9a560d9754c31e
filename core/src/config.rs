//! Central-role settings and configuration management
//!
//! Serializable to/from JSON, validated on every load and save.

use crate::adapter::ScanMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Complete central-role configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleSettings {
    /// How long a scan runs before the internal timer stops it
    pub scan_timeout_ms: u64,

    /// Radio duty cycle requested from the native scanner
    pub scan_mode: ScanMode,

    /// Ceiling applied to every queued GATT command
    pub command_timeout_ms: u64,

    /// Ceiling on waiting for the native stack to confirm a disconnect
    pub disconnect_timeout_ms: u64,

    /// Pause between enabling native notifications and writing the CCCD
    pub notify_settle_delay_ms: u64,

    /// Capacity of the broadcast channels for adapter events and value updates
    pub event_channel_capacity: usize,
}

impl Default for BleSettings {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 10_000,
            scan_mode: ScanMode::LowPower,
            command_timeout_ms: 10_000,
            disconnect_timeout_ms: 10_000,
            notify_settle_delay_ms: 100,
            event_channel_capacity: 256,
        }
    }
}

impl BleSettings {
    /// Create new settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.scan_timeout_ms == 0 {
            return Err(SettingsError::ConfigError(
                "scan_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.command_timeout_ms == 0 {
            return Err(SettingsError::ConfigError(
                "command_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.disconnect_timeout_ms == 0 {
            return Err(SettingsError::ConfigError(
                "disconnect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(SettingsError::ConfigError(
                "event_channel_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn notify_settle_delay(&self) -> Duration {
        Duration::from_millis(self.notify_settle_delay_ms)
    }

    /// Load settings from JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let settings: BleSettings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Convert to pretty JSON string
    pub fn to_json_string(&self) -> Result<String, SettingsError> {
        self.validate()?;
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Create from JSON string
    pub fn from_json_string(json: &str) -> Result<Self, SettingsError> {
        let settings: BleSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = BleSettings::default();
        assert_eq!(settings.scan_timeout(), Duration::from_secs(10));
        assert_eq!(settings.scan_mode, ScanMode::LowPower);
        assert_eq!(settings.command_timeout(), Duration::from_secs(10));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut settings = BleSettings::default();
        settings.command_timeout_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = BleSettings::default();
        settings.scan_timeout_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_channel_capacity_rejected() {
        let mut settings = BleSettings::default();
        settings.event_channel_capacity = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::ConfigError(_))
        ));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings = BleSettings::from_json_string(r#"{ "scan_timeout_ms": 2500, "scan_mode": "LowLatency" }"#)
            .expect("valid json");
        assert_eq!(settings.scan_timeout_ms, 2500);
        assert_eq!(settings.scan_mode, ScanMode::LowLatency);
        assert_eq!(settings.command_timeout_ms, 10_000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ble.json");

        let mut settings = BleSettings::default();
        settings.notify_settle_delay_ms = 0;
        settings.save(&path).expect("save");

        let loaded = BleSettings::load(&path).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_invalid_settings_not_saved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ble.json");

        let mut settings = BleSettings::default();
        settings.disconnect_timeout_ms = 0;
        assert!(settings.save(&path).is_err());
        assert!(!path.exists());
    }
}
