//! Event-to-future bridge.
//!
//! Native completions arrive as [`NativeEvent`]s on whatever thread the host
//! stack happens to use, and may fire inside the very call that triggered
//! them, late, twice, or never. [`from_event`] turns "perform an action, then
//! wait for the matching completion" into one cancellable future:
//!
//! 1. subscribe the matcher to the [`EventHub`]
//! 2. run the triggering action, returning its synchronous error if any
//! 3. resolve with the first of {matching outcome, cancellation}
//!
//! The subscription is dropped on every exit path. Settlement goes through a
//! [`Completion`], so only the first outcome is ever observed.

use crate::error::BleError;
use crate::platform::NativeEvent;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::trace;

type Handler = Arc<dyn Fn(&NativeEvent) + Send + Sync>;

// ============================================================================
// EVENT HUB
// ============================================================================

/// Fan-out point for native notifications.
#[derive(Default)]
pub struct EventHub {
    next_id: AtomicU64,
    handlers: Mutex<BTreeMap<u64, Handler>>,
}

impl EventHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a handler. It stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(&NativeEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().insert(id, Arc::new(handler));
        Subscription {
            hub: Arc::downgrade(self),
            id,
        }
    }

    /// Deliver an event to every handler registered at the time of the call.
    ///
    /// Handlers run without the registry lock held, so they may subscribe or
    /// unsubscribe freely.
    pub fn publish(&self, event: &NativeEvent) {
        let handlers: Vec<Handler> = self.handlers.lock().values().cloned().collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }

    fn unsubscribe(&self, id: u64) {
        self.handlers.lock().remove(&id);
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle to a registered handler; unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    hub: Weak<EventHub>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ============================================================================
// COMPLETION
// ============================================================================

/// At-most-once settlement slot shared by a waiter and its notifiers.
///
/// `Some(sender)` is the pending state; taking the sender settles it.
pub struct Completion<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<Result<T, BleError>>>>>,
}

impl<T> Completion<T> {
    pub fn new() -> (Self, oneshot::Receiver<Result<T, BleError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Settle with `outcome`. Returns false if already settled.
    pub fn settle(&self, outcome: Result<T, BleError>) -> bool {
        let sender = self.slot.lock().take();
        match sender {
            Some(tx) => {
                // The waiter may have gone away; settlement still counts.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

// ============================================================================
// BRIDGE
// ============================================================================

/// Run `action` and wait for the first notification `matcher` accepts.
///
/// `matcher` returns `Some(outcome)` for events that settle this wait and
/// `None` for everything else. `cancelled` resolving abandons the wait with
/// [`BleError::Cancelled`]; if it has already resolved the action is skipped.
pub async fn from_event<T, A, M, C>(
    hub: &Arc<EventHub>,
    cancelled: C,
    action: A,
    matcher: M,
) -> Result<T, BleError>
where
    T: Send + 'static,
    A: FnOnce() -> Result<(), BleError>,
    M: Fn(&NativeEvent) -> Option<Result<T, BleError>> + Send + Sync + 'static,
    C: Future<Output = ()>,
{
    let (completion, outcome) = Completion::new();
    let notifier = completion.clone();
    let _subscription = hub.subscribe(move |event| {
        if let Some(result) = matcher(event) {
            if !notifier.settle(result) {
                trace!("Ignoring late {} notification", event.kind());
            }
        }
    });

    tokio::pin!(cancelled);
    if (&mut cancelled).now_or_never().is_some() {
        return Err(BleError::Cancelled);
    }

    action()?;

    tokio::select! {
        biased;
        result = outcome => result.unwrap_or(Err(BleError::Cancelled)),
        _ = &mut cancelled => {
            completion.settle(Err(BleError::Cancelled));
            Err(BleError::Cancelled)
        }
    }
}

/// Resolves once any of the tokens is cancelled.
pub async fn cancelled_by_any(first: CancellationToken, second: CancellationToken) {
    tokio::select! {
        _ = first.cancelled() => {}
        _ = second.cancelled() => {}
    }
}

// ============================================================================
// TESTS
// ============================================================================
