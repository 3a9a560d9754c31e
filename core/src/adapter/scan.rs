use crate::device::Device;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Radio duty cycle requested from the native scanner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanMode {
    Passive,
    #[default]
    LowPower,
    Balanced,
    LowLatency,
}

/// Caller-supplied predicate applied to every advertisement.
pub type DeviceFilter = Arc<dyn Fn(&Device) -> bool + Send + Sync>;

/// Parameters of one scan run.
#[derive(Clone, Default)]
pub struct ScanOptions {
    /// Forwarded to the native scanner; empty means no service filter.
    pub service_uuids: Vec<Uuid>,
    pub device_filter: Option<DeviceFilter>,
    pub allow_duplicates: bool,
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, uuid: Uuid) -> Self {
        self.service_uuids.push(uuid);
        self
    }

    pub fn with_services<I: IntoIterator<Item = Uuid>>(mut self, uuids: I) -> Self {
        self.service_uuids.extend(uuids);
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Device) -> bool + Send + Sync + 'static,
    {
        self.device_filter = Some(Arc::new(filter));
        self
    }

    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }
}

impl fmt::Debug for ScanOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOptions")
            .field("service_uuids", &self.service_uuids)
            .field("device_filter", &self.device_filter.is_some())
            .field("allow_duplicates", &self.allow_duplicates)
            .finish()
    }
}
