use crate::device::{Device, DeviceId, LinkScope};
use crate::error::BleError;
use crate::gatt::{known, Characteristic, ServiceInfo, ServiceRef};
use crate::platform::NativeEvent;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// A GATT service discovered during one connection epoch.
pub struct Service {
    info: ServiceInfo,
    scope: LinkScope,
    characteristics: Mutex<Option<Vec<Arc<Characteristic>>>>,
    discovery: tokio::sync::Mutex<()>,
}

impl Service {
    pub(crate) fn new(info: ServiceInfo, scope: LinkScope) -> Arc<Self> {
        Arc::new(Self {
            info,
            scope,
            characteristics: Mutex::new(None),
            discovery: tokio::sync::Mutex::new(()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.info.id
    }

    pub fn is_primary(&self) -> bool {
        self.info.is_primary
    }

    pub fn name(&self) -> &'static str {
        known::service_name(&self.info.id).unwrap_or("Unknown Service")
    }

    pub fn device_id(&self) -> DeviceId {
        self.scope.device_id()
    }

    /// The owning device, while it is still alive.
    pub fn device(&self) -> Option<Arc<Device>> {
        self.scope.device()
    }

    pub fn reference(&self) -> ServiceRef {
        ServiceRef {
            device: self.scope.device_id(),
            service: self.info.id,
        }
    }

    /// True once the device cleared the epoch this service came from.
    pub fn is_stale(&self) -> bool {
        self.scope.is_stale()
    }

    /// Characteristics of this service, discovered once and then served
    /// from the cache. The returned list is a copy.
    pub async fn characteristics(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<Arc<Characteristic>>, BleError> {
        if let Some(cached) = self.characteristics.lock().clone() {
            return Ok(cached);
        }

        let _round = self.discovery.lock().await;
        if let Some(cached) = self.characteristics.lock().clone() {
            return Ok(cached);
        }

        let at = self.reference();
        let discovered = self
            .scope
            .request(
                token,
                move |bridge| bridge.discover_characteristics(at),
                move |event| match event {
                    NativeEvent::CharacteristicsDiscovered { service, result } if *service == at => {
                        Some(result.clone().map_err(BleError::Native))
                    }
                    _ => None,
                },
            )
            .await?;

        let characteristics: Vec<Arc<Characteristic>> = discovered
            .into_iter()
            .map(|info| Characteristic::new(info, at, self.scope.clone()))
            .collect();

        let mut cache = self.characteristics.lock();
        if self.scope.is_stale() {
            return Err(BleError::Cancelled);
        }
        *cache = Some(characteristics.clone());
        debug!("Cached {} characteristics for {}", characteristics.len(), at);
        Ok(characteristics)
    }

    pub async fn characteristic(
        &self,
        id: Uuid,
        token: &CancellationToken,
    ) -> Result<Option<Arc<Characteristic>>, BleError> {
        let characteristics = self.characteristics(token).await?;
        Ok(characteristics.into_iter().find(|c| c.id() == id))
    }

    pub(crate) fn dispose(&self) {
        if let Some(characteristics) = self.characteristics.lock().take() {
            for characteristic in characteristics {
                characteristic.dispose();
            }
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.info.id)
            .field("name", &self.name())
            .field("is_primary", &self.info.is_primary)
            .finish()
    }
}
