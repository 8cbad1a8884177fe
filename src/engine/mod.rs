//! Boundary to the native media engine
//!
//! The engine is a black box reached through a handle-based C surface.
//! [`Engine`] mirrors that surface one method per native entry point, so the
//! rest of the crate never touches raw pointers except where the ABI forces
//! it (callback userdata and blit destinations).
//!
//! Two implementations exist:
//! - `ffi::NativeEngine` (cargo feature `native`) links the real library
//! - [`sim::SimulatedEngine`] runs in-process and calls back from its own
//!   threads, exactly as the native engine would

pub mod context;
#[cfg(feature = "native")]
pub mod ffi;
pub mod sim;

use std::ffi::{c_char, c_int, c_void};
use std::path::Path;
use std::ptr::NonNull;

use crate::config::DecodingConfig;

pub use context::{EngineContext, EngineLease};
#[cfg(feature = "native")]
pub use ffi::NativeEngine;
pub use sim::SimulatedEngine;

/// Stream reached its natural end.
pub type EosFn = extern "C" fn(userdata: *mut c_void);

/// Unrecoverable pipeline error with a NUL-terminated diagnostic.
pub type ErrorFn = extern "C" fn(userdata: *mut c_void, message: *const c_char);

/// Quality-of-service report. Time fields are nanoseconds.
pub type QosFn = extern "C" fn(
    userdata: *mut c_void,
    jitter: i64,
    running_time: u64,
    stream_time: u64,
    timestamp: u64,
    proportion: f64,
    processed: u64,
    dropped: u64,
);

/// Engine diagnostic output.
pub type LogSinkFn = extern "C" fn(level: c_int, message: *const c_char);

/// Callbacks registered at pipeline creation.
///
/// `None` maps to a null function pointer on the native side.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCallbacks {
    pub on_eos: Option<EosFn>,
    pub on_error: Option<ErrorFn>,
    pub on_qos: Option<QosFn>,
}

/// Opaque pipeline handle owned by exactly one [`NativePipeline`].
///
/// Deliberately neither `Clone` nor `Copy`: the handle is consumed by
/// [`Engine::destroy`], so nothing can address it afterwards.
///
/// [`NativePipeline`]: crate::pipeline::NativePipeline
#[derive(Debug, PartialEq, Eq)]
pub struct PipelineHandle(NonNull<c_void>);

// Safety: the handle is an opaque token for the engine, which serializes
// access to the pipeline it names; we never dereference it.
unsafe impl Send for PipelineHandle {}

impl PipelineHandle {
    /// Wrap a pointer returned by the engine. Null means creation failed.
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// Copyable identity of the handle, for lookups and logging.
    pub fn id(&self) -> PipelineId {
        PipelineId(self.0.as_ptr() as usize)
    }
}

/// Address of a pipeline handle. Carries no ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(pub usize);

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The native engine's entry points.
///
/// Implementations must be callable from any thread. Methods taking a
/// handle trust their caller about lifecycle ordering: state checks are the
/// session's job.
pub trait Engine: Send + Sync {
    /// Process-wide initialization. Returns `false` if the engine failed to start.
    fn initialize(&self, debug: Option<&str>, log_sink: Option<LogSinkFn>) -> bool;

    /// Process-wide teardown, paired with a successful `initialize`.
    fn shutdown(&self);

    fn is_active(&self) -> bool;

    /// Create a pipeline. `userdata` is handed back verbatim as the first
    /// argument of every callback.
    fn create(
        &self,
        name: &str,
        callbacks: NativeCallbacks,
        userdata: usize,
    ) -> Option<PipelineHandle>;

    fn destroy(&self, handle: PipelineHandle);

    fn setup_decoding(&self, handle: &PipelineHandle, config: &DecodingConfig);

    fn setup_encoding(&self, handle: &PipelineHandle, path: &Path, width: u32, height: u32);

    fn play(&self, handle: &PipelineHandle);
    fn pause(&self, handle: &PipelineHandle);
    fn stop(&self, handle: &PipelineHandle);
    fn close(&self, handle: &PipelineHandle);

    fn is_loaded(&self, handle: &PipelineHandle) -> bool;
    fn is_playing(&self, handle: &PipelineHandle) -> bool;

    /// Non-blocking poll for a frame newer than the last one grabbed.
    fn grab_frame(&self, handle: &PipelineHandle) -> Option<(u32, u32)>;

    /// Copy the last grabbed frame into `surface`.
    ///
    /// # Safety
    ///
    /// `surface` must point at a destination this engine understands (a GPU
    /// texture for the native library, a [`CpuSurface`] for the simulated
    /// engine) and stay valid for the duration of the call.
    ///
    /// [`CpuSurface`]: crate::display::CpuSurface
    unsafe fn blit_image(&self, handle: &PipelineHandle, surface: NonNull<c_void>);

    /// Push one raw RGBA frame into an encoding pipeline. The slice is
    /// borrowed for the call only.
    fn consume_image(&self, handle: &PipelineHandle, data: &[u8]);

    /// Send end-of-stream down an encoding pipeline.
    fn stop_encoding(&self, handle: &PipelineHandle);

    /// Seconds.
    fn duration(&self, handle: &PipelineHandle) -> f64;
    /// Seconds.
    fn position(&self, handle: &PipelineHandle) -> f64;
    /// Seconds. Triggers an asynchronous seek.
    fn set_position(&self, handle: &PipelineHandle, position: f64);
    /// Nanoseconds.
    fn set_basetime(&self, handle: &PipelineHandle, basetime: u64);
    fn set_volume(&self, handle: &PipelineHandle, volume: f64);
    fn set_adaptive_bitrate_limit(&self, handle: &PipelineHandle, limit: f32);
}
