//! Per-link request plumbing.
//!
//! A [`LinkScope`] snapshots a device's identity and cancellation epoch. GATT
//! objects created during one discovery round keep the scope of that round,
//! so their waits die with it when the device clears its services.

use crate::context::BleContext;
use crate::device::{Device, DeviceId};
use crate::error::BleError;
use crate::platform::{BlePlatformBridge, NativeEvent};
use crate::sync::{cancelled_by_any, from_event, CommandHandle};
use futures::FutureExt;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

/// Opaque native connection handle. Swapped on every (re)connection while
/// the device identity stays put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkHandle(u64);

impl LinkHandle {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Clone)]
pub(crate) struct LinkScope {
    ctx: Arc<BleContext>,
    device: Weak<Device>,
    id: DeviceId,
    generation: u64,
    epoch: CancellationToken,
}

impl LinkScope {
    pub fn new(
        ctx: Arc<BleContext>,
        device: Weak<Device>,
        id: DeviceId,
        generation: u64,
        epoch: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            device,
            id,
            generation,
            epoch,
        }
    }

    pub fn ctx(&self) -> &Arc<BleContext> {
        &self.ctx
    }

    pub fn device_id(&self) -> DeviceId {
        self.id
    }

    pub fn device(&self) -> Option<Arc<Device>> {
        self.device.upgrade()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once the epoch this scope belongs to has ended.
    pub fn is_stale(&self) -> bool {
        self.epoch.is_cancelled()
    }

    pub fn ensure_linked(&self) -> Result<(), BleError> {
        match self.device.upgrade() {
            Some(device) if device.has_link() => Ok(()),
            _ => Err(BleError::NotConnected(self.id)),
        }
    }

    /// Queue a native request and wait for the notification `matcher`
    /// accepts. An unrequested link loss on this device rejects the wait
    /// with [`BleError::ConnectionLost`].
    pub async fn request<T, A, M>(
        &self,
        token: &CancellationToken,
        action: A,
        matcher: M,
    ) -> Result<T, BleError>
    where
        T: Send + 'static,
        A: FnOnce(&dyn BlePlatformBridge) -> Result<(), BleError> + Send + 'static,
        M: Fn(&NativeEvent) -> Option<Result<T, BleError>> + Send + Sync + 'static,
    {
        self.ensure_linked()?;

        let ctx = Arc::clone(&self.ctx);
        let id = self.id;
        let cancelled = cancelled_by_any(self.epoch.clone(), token.clone());
        let handle = self
            .ctx
            .queue
            .submit(self.ctx.settings.command_timeout(), async move {
                let bridge = Arc::clone(&ctx.bridge);
                from_event(
                    &ctx.hub,
                    cancelled,
                    move || action(bridge.as_ref()),
                    move |event| {
                        if event.is_link_loss(id) {
                            return Some(Err(BleError::ConnectionLost(id)));
                        }
                        matcher(event)
                    },
                )
                .await
            });
        self.settle(token, handle).await
    }

    /// Queue a native call that completes synchronously.
    pub async fn invoke<T, A>(&self, token: &CancellationToken, action: A) -> Result<T, BleError>
    where
        T: Send + 'static,
        A: FnOnce(&dyn BlePlatformBridge) -> Result<T, BleError> + Send + 'static,
    {
        self.ensure_linked()?;

        let bridge = Arc::clone(&self.ctx.bridge);
        let cancelled = cancelled_by_any(self.epoch.clone(), token.clone());
        let handle = self
            .ctx
            .queue
            .submit(self.ctx.settings.command_timeout(), async move {
                if cancelled.now_or_never().is_some() {
                    return Err(BleError::Cancelled);
                }
                action(bridge.as_ref())
            });
        self.settle(token, handle).await
    }

    /// Await a submitted command. The wait is abandoned as soon as this
    /// scope's epoch ends or the caller cancels, even while the command is
    /// still queued behind another device's work.
    async fn settle<T>(
        &self,
        token: &CancellationToken,
        mut handle: CommandHandle<T>,
    ) -> Result<T, BleError> {
        let result = tokio::select! {
            biased;
            result = &mut handle => result,
            _ = cancelled_by_any(self.epoch.clone(), token.clone()) => {
                handle.cancel();
                Err(BleError::Cancelled)
            }
        };
        result.map_err(|err| self.classify(err))
    }

    /// Waits abandoned because the link dropped report the loss, not a
    /// plain cancellation.
    fn classify(&self, err: BleError) -> BleError {
        match err {
            BleError::Cancelled if self.ended_by_link_loss() => BleError::ConnectionLost(self.id),
            other => other,
        }
    }

    fn ended_by_link_loss(&self) -> bool {
        self.device
            .upgrade()
            .map(|device| device.lost_generation() == Some(self.generation))
            .unwrap_or(false)
    }
}
