//! Owned wrapper around one native pipeline handle
//!
//! Every method forwards to the engine with the handle it owns. No lifecycle
//! checks happen here: the session decides which calls are allowed, and
//! loaded/playing status is always asked of the engine.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::{DecodingConfig, EncodingConfig};
use crate::engine::{Engine, NativeCallbacks, PipelineHandle, PipelineId};
use crate::error::{BridgeError, Result};

pub struct NativePipeline {
    engine: Arc<dyn Engine>,
    handle: PipelineHandle,
    name: String,
}

impl NativePipeline {
    /// Ask the engine for a new pipeline. `userdata` comes back verbatim as
    /// the first argument of every callback.
    pub fn create(
        engine: Arc<dyn Engine>,
        name: &str,
        callbacks: NativeCallbacks,
        userdata: usize,
    ) -> Result<Self> {
        let handle = engine
            .create(name, callbacks, userdata)
            .ok_or_else(|| BridgeError::PipelineCreation(name.to_string()))?;

        info!("[{}] Pipeline created ({})", name, handle.id());
        Ok(Self {
            engine,
            handle,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> PipelineId {
        self.handle.id()
    }

    pub fn setup_decoding(&self, config: &DecodingConfig) {
        debug!(
            "[{}] Setup decoding {} (video {}, audio {}, clock {:?})",
            self.name, config.uri, config.video_index, config.audio_index, config.network_clock
        );
        self.engine.setup_decoding(&self.handle, config);
    }

    pub fn setup_encoding(&self, config: &EncodingConfig) {
        debug!(
            "[{}] Setup encoding {} at {}x{}",
            self.name,
            config.path.display(),
            config.width,
            config.height
        );
        self.engine
            .setup_encoding(&self.handle, &config.path, config.width, config.height);
    }

    pub fn play(&self) {
        self.engine.play(&self.handle);
    }

    pub fn pause(&self) {
        self.engine.pause(&self.handle);
    }

    pub fn stop(&self) {
        self.engine.stop(&self.handle);
    }

    pub fn close(&self) {
        self.engine.close(&self.handle);
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_loaded(&self.handle)
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_playing(&self.handle)
    }

    /// Dimensions of a frame newer than the last one grabbed, if any.
    pub fn grab_frame(&self) -> Option<(u32, u32)> {
        self.engine.grab_frame(&self.handle)
    }

    /// Copy the last grabbed frame into `surface`. A missing surface is a no-op.
    ///
    /// # Safety
    ///
    /// See [`Engine::blit_image`].
    pub unsafe fn blit_into(&self, surface: Option<NonNull<c_void>>) {
        match surface {
            Some(surface) => unsafe { self.engine.blit_image(&self.handle, surface) },
            None => debug!("[{}] No destination surface, skipping blit", self.name),
        }
    }

    pub fn consume_image(&self, data: &[u8]) {
        self.engine.consume_image(&self.handle, data);
    }

    pub fn stop_encoding(&self) {
        self.engine.stop_encoding(&self.handle);
    }

    pub fn duration(&self) -> f64 {
        self.engine.duration(&self.handle)
    }

    pub fn position(&self) -> f64 {
        self.engine.position(&self.handle)
    }

    pub fn set_position(&self, seconds: f64) {
        self.engine.set_position(&self.handle, seconds);
    }

    pub fn set_basetime(&self, nanos: u64) {
        self.engine.set_basetime(&self.handle, nanos);
    }

    /// Clamped to 0..=1 before it reaches the engine.
    pub fn set_volume(&self, volume: f64) {
        let clamped = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.engine.set_volume(&self.handle, clamped);
    }

    /// Clamped to 0..=1 before it reaches the engine.
    pub fn set_adaptive_bitrate_limit(&self, limit: f32) {
        let clamped = if limit.is_nan() { 1.0 } else { limit.clamp(0.0, 1.0) };
        self.engine.set_adaptive_bitrate_limit(&self.handle, clamped);
    }

    /// Release the native pipeline. The handle is gone afterwards.
    pub fn destroy(self) {
        info!("[{}] Destroying pipeline ({})", self.name, self.handle.id());
        self.engine.destroy(self.handle);
    }

    /// Give up on the native pipeline without releasing it.
    ///
    /// Used when the engine cannot be trusted to be done with the handle yet;
    /// leaking is the only safe outcome then.
    pub fn leak(self) {
        warn!(
            "[{}] Leaking native pipeline {} without destroying it",
            self.name,
            self.handle.id()
        );
    }
}

impl fmt::Debug for NativePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativePipeline")
            .field("name", &self.name)
            .field("handle", &self.handle.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulatedEngine;

    fn pipeline() -> (Arc<SimulatedEngine>, NativePipeline) {
        let engine = Arc::new(SimulatedEngine::new());
        let pipeline =
            NativePipeline::create(engine.clone(), "test", NativeCallbacks::default(), 7).unwrap();
        (engine, pipeline)
    }

    #[test]
    fn test_forwards_to_engine() {
        let (engine, pipeline) = pipeline();
        let id = pipeline.id();

        pipeline.setup_decoding(&DecodingConfig::new("file:///a.mp4", 0, -1));
        assert!(pipeline.is_loaded());
        pipeline.play();
        pipeline.set_position(3.5);
        assert_eq!(pipeline.position(), 3.5);

        let snapshot = engine.snapshot(id).unwrap();
        assert_eq!(snapshot.uri.as_deref(), Some("file:///a.mp4"));
        assert_eq!(snapshot.userdata, 7);
        assert!(snapshot.play_requested);
    }

    #[test]
    fn test_volume_and_bitrate_clamped() {
        let (engine, pipeline) = pipeline();
        let id = pipeline.id();

        pipeline.set_volume(3.0);
        assert_eq!(engine.snapshot(id).unwrap().volume, 1.0);
        pipeline.set_volume(-0.5);
        assert_eq!(engine.snapshot(id).unwrap().volume, 0.0);

        pipeline.set_adaptive_bitrate_limit(1.5);
        assert_eq!(engine.snapshot(id).unwrap().adaptive_bitrate_limit, 1.0);
        pipeline.set_adaptive_bitrate_limit(0.25);
        assert_eq!(engine.snapshot(id).unwrap().adaptive_bitrate_limit, 0.25);
    }

    #[test]
    fn test_destroy_releases_handle() {
        let (engine, pipeline) = pipeline();
        let id = pipeline.id();
        pipeline.destroy();
        assert!(engine.snapshot(id).is_none());
        assert_eq!(engine.call_count(id, "destroy"), 1);
    }

    #[test]
    fn test_blit_without_surface_is_noop() {
        let (engine, pipeline) = pipeline();
        let id = pipeline.id();
        unsafe { pipeline.blit_into(None) };
        assert_eq!(engine.call_count(id, "blit_image"), 0);
    }
}
