//! Bindings to the native GstUnityBridge library
//!
//! Built only with the `native` cargo feature; `build.rs` adds
//! `GUB_LIB_DIR` to the link search path.

use std::ffi::{CString, c_char, c_double, c_float, c_int, c_void};
use std::path::Path;
use std::ptr::{self, NonNull};

use log::{error, warn};

use super::{Engine, EosFn, ErrorFn, LogSinkFn, NativeCallbacks, PipelineHandle, QosFn};
use crate::config::{ClockMode, DecodingConfig};

type RawPipeline = *mut c_void;

#[link(name = "GstUnityBridge")]
unsafe extern "C" {
    fn gub_ref(gst_debug_string: *const c_char);
    fn gub_unref();
    fn gub_is_active() -> c_int;
    fn gub_log_set_unity_handler(handler: Option<LogSinkFn>);

    fn gub_pipeline_create(
        name: *const c_char,
        eos_pfn: Option<EosFn>,
        error_pfn: Option<ErrorFn>,
        qos_pfn: Option<QosFn>,
        userdata: *mut c_void,
    ) -> RawPipeline;
    fn gub_pipeline_destroy(p: RawPipeline);
    fn gub_pipeline_play(p: RawPipeline);
    fn gub_pipeline_pause(p: RawPipeline);
    fn gub_pipeline_stop(p: RawPipeline);
    fn gub_pipeline_close(p: RawPipeline);
    fn gub_pipeline_is_loaded(p: RawPipeline) -> c_int;
    fn gub_pipeline_is_playing(p: RawPipeline) -> c_int;

    fn gub_pipeline_setup_decoding_clock(
        p: RawPipeline,
        uri: *const c_char,
        video_index: c_int,
        audio_index: c_int,
        net_clock_address: *const c_char,
        net_clock_port: c_int,
        basetime: u64,
        crop_left: c_float,
        crop_top: c_float,
        crop_right: c_float,
        crop_bottom: c_float,
        is_dvb_wc: c_int,
    );
    fn gub_pipeline_grab_frame(p: RawPipeline, width: *mut c_int, height: *mut c_int) -> c_int;
    fn gub_pipeline_blit_image(p: RawPipeline, texture: *mut c_void);

    fn gub_pipeline_setup_encoding(
        p: RawPipeline,
        filename: *const c_char,
        width: c_int,
        height: c_int,
    );
    fn gub_pipeline_consume_image(p: RawPipeline, rawdata: *mut u8, size: c_int);
    fn gub_pipeline_stop_encoding(p: RawPipeline);

    fn gub_pipeline_get_duration(p: RawPipeline) -> c_double;
    fn gub_pipeline_get_position(p: RawPipeline) -> c_double;
    fn gub_pipeline_set_position(p: RawPipeline, position: c_double);
    fn gub_pipeline_set_basetime(p: RawPipeline, basetime: u64);
    fn gub_pipeline_set_volume(p: RawPipeline, volume: c_double);
    fn gub_pipeline_set_adaptive_bitrate_limit(p: RawPipeline, limit: c_float);
}

fn c_string(what: &str, value: &str) -> Option<CString> {
    match CString::new(value) {
        Ok(s) => Some(s),
        Err(_) => {
            error!("{} contains an interior NUL byte: {:?}", what, value);
            None
        }
    }
}

fn c_size(value: u32) -> Option<c_int> {
    c_int::try_from(value).ok()
}

/// The real engine. Stateless: all state lives in the library.
#[derive(Debug, Default)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for NativeEngine {
    fn initialize(&self, debug: Option<&str>, log_sink: Option<LogSinkFn>) -> bool {
        let debug = debug.and_then(|d| c_string("Engine debug string", d));
        unsafe {
            gub_log_set_unity_handler(log_sink);
            gub_ref(debug.as_ref().map_or(ptr::null(), |d| d.as_ptr()));
            gub_is_active() != 0
        }
    }

    fn shutdown(&self) {
        unsafe {
            gub_unref();
            gub_log_set_unity_handler(None);
        }
    }

    fn is_active(&self) -> bool {
        unsafe { gub_is_active() != 0 }
    }

    fn create(
        &self,
        name: &str,
        callbacks: NativeCallbacks,
        userdata: usize,
    ) -> Option<PipelineHandle> {
        let name = c_string("Pipeline name", name)?;
        let raw = unsafe {
            gub_pipeline_create(
                name.as_ptr(),
                callbacks.on_eos,
                callbacks.on_error,
                callbacks.on_qos,
                userdata as *mut c_void,
            )
        };
        PipelineHandle::from_raw(raw)
    }

    fn destroy(&self, handle: PipelineHandle) {
        unsafe { gub_pipeline_destroy(handle.as_ptr()) }
    }

    fn setup_decoding(&self, handle: &PipelineHandle, config: &DecodingConfig) {
        let Some(uri) = c_string("URI", &config.uri) else {
            return;
        };
        let clock_address = match &config.network_clock {
            Some(clock) => match c_string("Clock address", &clock.address) {
                Some(address) => Some(address),
                None => return,
            },
            None => None,
        };
        let (port, dvb) = config
            .network_clock
            .as_ref()
            .map_or((0, false), |c| (c.port, c.mode == ClockMode::DvbWallClock));
        let crop = config.crop;

        unsafe {
            gub_pipeline_setup_decoding_clock(
                handle.as_ptr(),
                uri.as_ptr(),
                config.video_index,
                config.audio_index,
                clock_address.as_ref().map_or(ptr::null(), |a| a.as_ptr()),
                c_int::from(port),
                config.base_time,
                crop.left,
                crop.top,
                crop.right,
                crop.bottom,
                c_int::from(dvb),
            )
        }
    }

    fn setup_encoding(&self, handle: &PipelineHandle, path: &Path, width: u32, height: u32) {
        let Some(filename) = c_string("Output path", &path.to_string_lossy()) else {
            return;
        };
        let (Some(width), Some(height)) = (c_size(width), c_size(height)) else {
            error!("Encoding size {}x{} out of range", width, height);
            return;
        };
        unsafe { gub_pipeline_setup_encoding(handle.as_ptr(), filename.as_ptr(), width, height) }
    }

    fn play(&self, handle: &PipelineHandle) {
        unsafe { gub_pipeline_play(handle.as_ptr()) }
    }

    fn pause(&self, handle: &PipelineHandle) {
        unsafe { gub_pipeline_pause(handle.as_ptr()) }
    }

    fn stop(&self, handle: &PipelineHandle) {
        unsafe { gub_pipeline_stop(handle.as_ptr()) }
    }

    fn close(&self, handle: &PipelineHandle) {
        unsafe { gub_pipeline_close(handle.as_ptr()) }
    }

    fn is_loaded(&self, handle: &PipelineHandle) -> bool {
        unsafe { gub_pipeline_is_loaded(handle.as_ptr()) != 0 }
    }

    fn is_playing(&self, handle: &PipelineHandle) -> bool {
        unsafe { gub_pipeline_is_playing(handle.as_ptr()) != 0 }
    }

    fn grab_frame(&self, handle: &PipelineHandle) -> Option<(u32, u32)> {
        let (mut width, mut height): (c_int, c_int) = (0, 0);
        let found = unsafe { gub_pipeline_grab_frame(handle.as_ptr(), &mut width, &mut height) };
        if found == 0 {
            return None;
        }
        Some((u32::try_from(width).ok()?, u32::try_from(height).ok()?))
    }

    unsafe fn blit_image(&self, handle: &PipelineHandle, surface: NonNull<c_void>) {
        unsafe { gub_pipeline_blit_image(handle.as_ptr(), surface.as_ptr()) }
    }

    fn consume_image(&self, handle: &PipelineHandle, data: &[u8]) {
        let Ok(size) = c_int::try_from(data.len()) else {
            warn!("Dropping {} byte frame: too large for the engine", data.len());
            return;
        };
        // The engine copies the buffer before returning and never writes to it.
        unsafe { gub_pipeline_consume_image(handle.as_ptr(), data.as_ptr().cast_mut(), size) }
    }

    fn stop_encoding(&self, handle: &PipelineHandle) {
        unsafe { gub_pipeline_stop_encoding(handle.as_ptr()) }
    }

    fn duration(&self, handle: &PipelineHandle) -> f64 {
        unsafe { gub_pipeline_get_duration(handle.as_ptr()) }
    }

    fn position(&self, handle: &PipelineHandle) -> f64 {
        unsafe { gub_pipeline_get_position(handle.as_ptr()) }
    }

    fn set_position(&self, handle: &PipelineHandle, position: f64) {
        unsafe { gub_pipeline_set_position(handle.as_ptr(), position) }
    }

    fn set_basetime(&self, handle: &PipelineHandle, basetime: u64) {
        unsafe { gub_pipeline_set_basetime(handle.as_ptr(), basetime) }
    }

    fn set_volume(&self, handle: &PipelineHandle, volume: f64) {
        unsafe { gub_pipeline_set_volume(handle.as_ptr(), volume) }
    }

    fn set_adaptive_bitrate_limit(&self, handle: &PipelineHandle, limit: f32) {
        unsafe { gub_pipeline_set_adaptive_bitrate_limit(handle.as_ptr(), limit) }
    }
}
