use crate::adapter::Adapter;
use crate::ble::BluetoothLe;
use crate::platform::NativeEvent;
use std::sync::Weak;
use tracing::trace;

#[derive(Debug, Clone)]
enum Target {
    Root(Weak<BluetoothLe>),
    Adapter(Weak<Adapter>),
}

/// Entry point for native notifications.
///
/// Platform code holds one of these and calls [`EventSink::deliver`] from
/// whatever thread its callbacks run on. The sink holds no strong reference,
/// so it never keeps the stack alive.
#[derive(Debug, Clone)]
pub struct EventSink {
    target: Target,
}

impl EventSink {
    pub(crate) fn for_root(root: Weak<BluetoothLe>) -> Self {
        Self {
            target: Target::Root(root),
        }
    }

    pub(crate) fn for_adapter(adapter: Weak<Adapter>) -> Self {
        Self {
            target: Target::Adapter(adapter),
        }
    }

    pub fn deliver(&self, event: NativeEvent) {
        let kind = event.kind();
        let delivered = match &self.target {
            Target::Root(root) => root.upgrade().map(|root| root.notify(event)),
            Target::Adapter(adapter) => adapter.upgrade().map(|adapter| adapter.notify(event)),
        };
        if delivered.is_none() {
            trace!("Dropping {} notification: stack shut down", kind);
        }
    }
}
