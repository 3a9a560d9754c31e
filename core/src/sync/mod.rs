//! Asynchronous plumbing shared by every GATT operation: the event-to-future
//! bridge, the single-flight command queue and cancellation epochs.

pub mod command_queue;
pub mod epoch;
pub mod event_future;

pub use command_queue::{CommandHandle, CommandQueue};
pub use epoch::Epoch;
pub use event_future::{cancelled_by_any, from_event, Completion, EventHub, Subscription};
