//! `extern "C"` entry points handed to the engine
//!
//! Each one runs on an engine thread. It resolves the userdata token, copies
//! whatever the engine passed into owned values, and queues the real work
//! for the host thread. Nothing here blocks or touches host state, and no
//! panic is allowed to unwind into the engine.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};

use log::{Level, error, log, trace};

use super::binding::{self, BindingTarget, BindingToken};
use crate::engine::{EosFn, ErrorFn, NativeCallbacks, QosFn};
use crate::pipeline::QosData;

/// Callback set every session registers at pipeline creation.
pub fn marshaled_callbacks() -> NativeCallbacks {
    NativeCallbacks {
        on_eos: Some(on_eos as EosFn),
        on_error: Some(on_error as ErrorFn),
        on_qos: Some(on_qos as QosFn),
    }
}

fn guarded(what: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!("Panic while handling native {} callback", what);
    }
}

/// Queue `deliver` on the binding behind `userdata`. The token is resolved
/// again when the action runs, so a session torn down in between is never
/// reached.
fn marshal(
    what: &'static str,
    userdata: *mut c_void,
    mark: impl FnOnce(&binding::InstanceBinding),
    deliver: impl FnOnce(&dyn BindingTarget) + Send + 'static,
) {
    dispatch(what, BindingToken::from_userdata(userdata as usize), mark, deliver);
}

fn dispatch(
    what: &'static str,
    token: BindingToken,
    mark: impl FnOnce(&binding::InstanceBinding),
    deliver: impl FnOnce(&dyn BindingTarget) + Send + 'static,
) {
    let Some(binding) = binding::get_instance().resolve(token) else {
        trace!("Dropping {} callback for released binding {}", what, token);
        return;
    };

    mark(&binding);
    binding.queue().submit(move || match binding::get_instance().resolve(token) {
        Some(binding) => deliver(binding.target()),
        None => trace!("Binding {} released before its {} event ran", token, what),
    });
}

pub extern "C" fn on_eos(userdata: *mut c_void) {
    guarded("end-of-stream", || {
        marshal("eos", userdata, |b| b.mark_eos(), |target| target.finished());
    });
}

pub extern "C" fn on_error(userdata: *mut c_void, message: *const c_char) {
    guarded("error", || {
        let message = unsafe { owned_message(message) };
        marshal(
            "error",
            userdata,
            |b| b.mark_error(),
            move |target| target.failed(&message),
        );
    });
}

/// Report an error the host detected itself through the same path as an
/// engine error, so it is observed asynchronously like every other one.
pub(crate) fn post_error(token: BindingToken, message: String) {
    dispatch(
        "error",
        token,
        |b| b.mark_error(),
        move |target| target.failed(&message),
    );
}

#[allow(clippy::too_many_arguments)]
pub extern "C" fn on_qos(
    userdata: *mut c_void,
    jitter: i64,
    running_time: u64,
    stream_time: u64,
    timestamp: u64,
    proportion: f64,
    processed: u64,
    dropped: u64,
) {
    guarded("qos", || {
        let qos = QosData {
            jitter,
            running_time,
            stream_time,
            timestamp,
            proportion,
            processed,
            dropped,
        };
        marshal("qos", userdata, |_| {}, move |target| target.qos(&qos));
    });
}

/// Engine diagnostics, forwarded into `log` under the `engine` target.
///
/// Levels: 0 error, 1 assertion, 2 warning, 3 message, 4 exception.
pub extern "C" fn log_sink(level: c_int, message: *const c_char) {
    guarded("log", || {
        let message = unsafe { owned_message(message) };
        log!(target: "engine", engine_level(level), "{}", message.trim_end());
    });
}

fn engine_level(level: c_int) -> Level {
    match level {
        0 | 1 | 4 => Level::Error,
        2 => Level::Warn,
        3 => Level::Debug,
        _ => Level::Trace,
    }
}

/// # Safety
///
/// `message` is null or a NUL-terminated string valid for this call.
unsafe fn owned_message(message: *const c_char) -> String {
    if message.is_null() {
        return String::from("<no message>");
    }
    unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}
