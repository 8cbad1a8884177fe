//! Small shared helpers

pub mod sos;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use sos::StopSignal;

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Queued actions run user code under `catch_unwind`; a panic there must not
/// turn every later lock of shared session state into a second panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
