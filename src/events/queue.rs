//! Ordered, exactly-once hand-off from producer threads to the host thread
//!
//! # Design
//!
//! Two lists:
//! - **pending**: appended to by any thread under the queue lock
//! - **executing**: private to the consumer; filled by swapping it with
//!   `pending` at the start of a drain
//!
//! The lock is held for the push and for the swap only, never while an
//! action runs. Actions submitted while a drain is executing land in the
//! fresh pending list and run on the next drain, so one tick always does a
//! bounded amount of work.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, TryLockError};

use log::{error, trace, warn};

use crate::utils::lock;

/// A deferred unit of work with no arguments and no result.
pub type QueuedAction = Box<dyn FnOnce() + Send + 'static>;

/// Mailbox drained once per tick by a single consumer thread.
pub struct EventQueue {
    pending: Mutex<Vec<QueuedAction>>,
    /// Only ever locked by the consumer, so it never contends with producers.
    executing: Mutex<Vec<QueuedAction>>,
    closed: AtomicBool,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            executing: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue `action` for the next drain.
    ///
    /// Callable from any thread. Never blocks beyond the append. After
    /// [`close`](Self::close) the action is dropped without notice.
    pub fn submit<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_boxed(Box::new(action));
    }

    pub fn submit_boxed(&self, action: QueuedAction) {
        let mut pending = lock(&self.pending);
        // Checked under the lock so a concurrent close() cannot strand an action.
        if self.closed.load(Ordering::Acquire) {
            trace!("EventQueue: dropping action submitted after close");
            return;
        }
        pending.push(action);
    }

    /// Run every action pending at call time, in submission order.
    ///
    /// Must be called from the consumer thread only. A panicking action is
    /// logged and skipped; the rest of the batch still runs. Returns the
    /// number of actions executed.
    pub fn drain_and_execute_all(&self) -> usize {
        let mut executing = match self.executing.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                warn!("EventQueue: re-entrant drain ignored");
                return 0;
            }
        };

        {
            let mut pending = lock(&self.pending);
            if pending.is_empty() {
                return 0;
            }
            std::mem::swap(&mut *executing, &mut *pending);
        }

        let mut executed = 0;
        for action in executing.drain(..) {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(action)) {
                error!(
                    "EventQueue: queued action panicked: {}",
                    panic_message(panic.as_ref())
                );
            }
            executed += 1;
        }
        executed
    }

    /// Number of actions waiting for the next drain.
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_len() == 0
    }

    /// Tear the queue down: pending actions are discarded and later
    /// submissions become no-ops.
    pub fn close(&self) {
        let discarded = {
            let mut pending = lock(&self.pending);
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *pending)
        };
        if !discarded.is_empty() {
            trace!("EventQueue: discarded {} pending actions", discarded.len());
        }
        // Dropped outside the lock: captured state may have its own Drop logic.
        drop(discarded);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending_len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
