//! Single-flight command queue.
//!
//! Most native stacks cannot run two GATT operations on a link at once, and
//! many cannot run them across links either. Every request/response
//! operation therefore goes through one FIFO that executes exactly one
//! command at a time. Each command carries its own timeout and can be
//! cancelled individually or, while still waiting, in bulk.

use crate::error::BleError;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

type BoxedCommand = Pin<Box<dyn Future<Output = ()> + Send>>;

struct QueuedCommand {
    seq: u64,
    token: CancellationToken,
    run: BoxedCommand,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedCommand>,
    running: bool,
    next_seq: u64,
}

/// FIFO executor for GATT commands. Cloning yields another handle to the
/// same queue.
#[derive(Clone, Default)]
pub struct CommandQueue {
    state: Arc<Mutex<QueueState>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `operation`. It starts once every earlier command has
    /// settled, and is abandoned with [`BleError::Timeout`] if it runs for
    /// longer than `timeout`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit<T, F>(&self, timeout: Duration, operation: F) -> CommandHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, BleError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let guard = token.clone();

        let run: BoxedCommand = Box::pin(async move {
            let operation = AssertUnwindSafe(operation).catch_unwind();
            let outcome = tokio::select! {
                biased;
                _ = guard.cancelled() => Err(BleError::Cancelled),
                result = tokio::time::timeout(timeout, operation) => match result {
                    Ok(Ok(settled)) => settled,
                    Ok(Err(panic)) => Err(BleError::Native(panic_message(panic.as_ref()))),
                    Err(_) => Err(BleError::Timeout(timeout)),
                },
            };
            let _ = tx.send(outcome);
        });

        let (seq, start) = {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending.push_back(QueuedCommand {
                seq,
                token: token.clone(),
                run,
            });
            let start = !state.running;
            state.running = true;
            (seq, start)
        };

        trace!("Queued command #{}", seq);
        if start {
            tokio::spawn(Self::drain(Arc::clone(&self.state)));
        }

        CommandHandle { seq, token, rx }
    }

    /// Abort every command still waiting. The one currently executing is
    /// left alone. Returns how many were aborted.
    pub fn cancel_pending(&self) -> usize {
        let aborted: Vec<QueuedCommand> = self.state.lock().pending.drain(..).collect();
        let count = aborted.len();
        for command in &aborted {
            command.token.cancel();
        }
        // Dropping the commands drops their senders, settling each handle
        // with Cancelled.
        drop(aborted);

        if count > 0 {
            debug!("Cancelled {} pending commands", count);
        }
        count
    }

    /// Number of commands waiting behind the one in flight.
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a command is executing or waiting.
    pub fn is_busy(&self) -> bool {
        self.state.lock().running
    }

    async fn drain(state: Arc<Mutex<QueueState>>) {
        loop {
            let next = {
                let mut guard = state.lock();
                match guard.pending.pop_front() {
                    Some(command) => command,
                    None => {
                        guard.running = false;
                        return;
                    }
                }
            };

            trace!("Executing command #{}", next.seq);
            next.run.await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    warn!("Command panicked: {}", detail);
    format!("command panicked: {}", detail)
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CommandQueue")
            .field("pending", &state.pending.len())
            .field("running", &state.running)
            .finish()
    }
}

/// Completion handle for a submitted command.
#[must_use = "dropping a command handle discards its result"]
pub struct CommandHandle<T> {
    seq: u64,
    token: CancellationToken,
    rx: oneshot::Receiver<Result<T, BleError>>,
}

impl<T> CommandHandle<T> {
    /// Cancel this command, whether queued or executing.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl<T> Future for CommandHandle<T> {
    type Output = Result<T, BleError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BleError::Cancelled)))
    }
}
