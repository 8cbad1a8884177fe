//! Host callbacks registered on a session
//!
//! Observers always run on the consumer thread, inside a tick. The list
//! being notified is taken out of the lock for the duration of the calls,
//! so an observer may register further observers; those run from the next
//! notification on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

use log::error;

use crate::pipeline::QosData;
use crate::utils::lock;

pub type StartObserver = Box<dyn FnMut() + Send>;
pub type FinishObserver = Box<dyn FnMut() + Send>;
pub type ErrorObserver = Box<dyn FnMut(&str) + Send>;
pub type QosObserver = Box<dyn FnMut(&QosData) + Send>;

#[derive(Default)]
struct Observers {
    start: Vec<StartObserver>,
    finish: Vec<FinishObserver>,
    error: Vec<ErrorObserver>,
    qos: Vec<QosObserver>,
}

#[derive(Default)]
pub struct ObserverSet {
    inner: Mutex<Observers>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_start(&self, observer: StartObserver) {
        lock(&self.inner).start.push(observer);
    }

    pub fn add_finish(&self, observer: FinishObserver) {
        lock(&self.inner).finish.push(observer);
    }

    pub fn add_error(&self, observer: ErrorObserver) {
        lock(&self.inner).error.push(observer);
    }

    pub fn add_qos(&self, observer: QosObserver) {
        lock(&self.inner).qos.push(observer);
    }

    pub fn notify_start(&self) {
        let mut taken = std::mem::take(&mut lock(&self.inner).start);
        run_all(&mut taken, "start", |f| f());
        restore(&mut lock(&self.inner).start, taken);
    }

    pub fn notify_finish(&self) {
        let mut taken = std::mem::take(&mut lock(&self.inner).finish);
        run_all(&mut taken, "finish", |f| f());
        restore(&mut lock(&self.inner).finish, taken);
    }

    pub fn notify_error(&self, message: &str) {
        let mut taken = std::mem::take(&mut lock(&self.inner).error);
        run_all(&mut taken, "error", |f| f(message));
        restore(&mut lock(&self.inner).error, taken);
    }

    pub fn notify_qos(&self, qos: &QosData) {
        let mut taken = std::mem::take(&mut lock(&self.inner).qos);
        run_all(&mut taken, "qos", |f| f(qos));
        restore(&mut lock(&self.inner).qos, taken);
    }
}

fn run_all<T>(observers: &mut [T], what: &str, mut call: impl FnMut(&mut T)) {
    for observer in observers.iter_mut() {
        if panic::catch_unwind(AssertUnwindSafe(|| call(observer))).is_err() {
            error!("A {} observer panicked", what);
        }
    }
}

/// Put `taken` back in front of anything registered while it was out.
fn restore<T>(slot: &mut Vec<T>, mut taken: Vec<T>) {
    taken.append(slot);
    *slot = taken;
}
