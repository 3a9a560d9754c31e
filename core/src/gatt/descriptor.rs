use crate::device::LinkScope;
use crate::error::BleError;
use crate::gatt::{known, DescriptorRef};
use crate::platform::NativeEvent;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A descriptor of a discovered characteristic.
pub struct Descriptor {
    at: DescriptorRef,
    scope: LinkScope,
    value: RwLock<Vec<u8>>,
}

impl Descriptor {
    pub(crate) fn new(at: DescriptorRef, scope: LinkScope) -> Arc<Self> {
        Arc::new(Self {
            at,
            scope,
            value: RwLock::new(Vec::new()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.at.descriptor
    }

    pub fn name(&self) -> &'static str {
        known::descriptor_name(&self.at.descriptor).unwrap_or("Unknown Descriptor")
    }

    pub fn reference(&self) -> DescriptorRef {
        self.at
    }

    /// Last value read or written.
    pub fn value(&self) -> Vec<u8> {
        self.value.read().clone()
    }

    pub async fn read(&self, token: &CancellationToken) -> Result<Vec<u8>, BleError> {
        let at = self.at;
        let value = self
            .scope
            .request(
                token,
                move |bridge| bridge.read_descriptor(at),
                move |event| match event {
                    NativeEvent::DescriptorRead { descriptor, result } if *descriptor == at => {
                        Some(result.clone().map_err(BleError::Native))
                    }
                    _ => None,
                },
            )
            .await?;
        *self.value.write() = value.clone();
        Ok(value)
    }

    pub async fn write(&self, data: &[u8], token: &CancellationToken) -> Result<(), BleError> {
        let at = self.at;
        let payload = data.to_vec();
        self.scope
            .request(
                token,
                move |bridge| bridge.write_descriptor(at, &payload),
                move |event| match event {
                    NativeEvent::DescriptorWritten { descriptor, result } if *descriptor == at => {
                        Some(result.clone().map_err(BleError::Native))
                    }
                    _ => None,
                },
            )
            .await?;
        *self.value.write() = data.to_vec();
        Ok(())
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.at.descriptor)
            .field("name", &self.name())
            .finish()
    }
}
