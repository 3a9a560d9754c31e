use crate::config::BleSettings;
use crate::platform::BlePlatformBridge;
use crate::sync::{CommandQueue, EventHub};
use std::fmt;
use std::sync::Arc;

/// Shared plumbing handed to every adapter, device and attribute object.
pub(crate) struct BleContext {
    pub bridge: Arc<dyn BlePlatformBridge>,
    pub hub: Arc<EventHub>,
    pub queue: CommandQueue,
    pub settings: BleSettings,
}

impl BleContext {
    pub fn new(bridge: Arc<dyn BlePlatformBridge>, settings: BleSettings) -> Arc<Self> {
        Arc::new(Self {
            bridge,
            hub: EventHub::new(),
            queue: CommandQueue::new(),
            settings,
        })
    }
}

impl fmt::Debug for BleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BleContext")
            .field("hub", &self.hub)
            .field("queue", &self.queue)
            .finish()
    }
}
