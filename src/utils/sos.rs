use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Cloneable stop flag with a blocking wait.
///
/// The demo host flips it from the Ctrl-C handler and sleeps on it between
/// ticks, so a stop request interrupts the tick interval immediately.
#[derive(Debug, Clone)]
pub struct StopSignal {
    // Shared state between clones
    shared: Arc<SharedState>,
}

#[derive(Debug)]
struct SharedState {
    stopping: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl StopSignal {
    pub fn new() -> StopSignal {
        StopSignal {
            shared: Arc::new(SharedState {
                stopping: AtomicBool::new(false),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::Release);

        // Lock briefly to synchronize with waiting threads
        let _guard = self
            .shared
            .mutex
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.shared.condvar.notify_all();
    }

    pub fn stopped(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }

    /// Sleep for at most `timeout`, returning early once stopped.
    ///
    /// Returns `true` when the signal has been raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self
            .shared
            .mutex
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (_guard, _) = self
            .shared
            .condvar
            .wait_timeout_while(guard, timeout, |_| !self.stopped())
            .unwrap_or_else(PoisonError::into_inner);

        self.stopped()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
