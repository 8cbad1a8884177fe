//! Host-facing façade over one native pipeline
//!
//! A [`Session`] owns everything one pipeline needs on the host side: the
//! engine lease, the native handle, the callback binding, the event queue
//! and the destination image. It is driven from a single thread that calls
//! [`Session::advance`] once per tick; every observer runs inside that call.
//!
//! # Teardown
//!
//! Destroying a decoding session releases the handle right away. An
//! encoding session first sends end-of-stream and blocks until the engine
//! reports it (or an error), polling at `teardown.eos_poll_interval_ms`.
//! This is the only blocking wait on the host thread.

mod observers;
mod shared;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};

use crate::bridge::{self, BindingTarget, BindingToken, binding, trampoline};
use crate::config::{BridgeConfig, DecodingConfig, EncodingConfig};
use crate::display::{FrameAcquisition, FramePoll, ImageBuffer, PixelBuffer};
use crate::engine::{EngineContext, EngineLease, PipelineId};
use crate::error::{BridgeError, Result};
use crate::events::EventQueue;
use crate::pipeline::{
    Direction, HealthSummary, NativePipeline, PipelineState, QosData, Transport,
};
use crate::utils::lock;

pub use observers::{ErrorObserver, FinishObserver, QosObserver, StartObserver};
use shared::{SessionCore, SessionShared, Status};

/// What one [`Session::advance`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub frame: FramePoll,
    /// Queued engine events executed during this tick
    pub events: usize,
}

pub struct Session<I: ImageBuffer = PixelBuffer> {
    context: Arc<EngineContext>,
    config: BridgeConfig,
    image: I,
    queue: Arc<EventQueue>,
    /// Shared queues are drained but never closed by this session.
    owns_queue: bool,
    shared: Arc<SessionShared>,
    lease: Option<EngineLease>,
    token: Option<BindingToken>,
    frames: FrameAcquisition,
    encoding: Option<EncodingConfig>,
}

impl Session<PixelBuffer> {
    /// Session drawing into a CPU-memory RGBA image of the configured
    /// initial size.
    pub fn new(context: Arc<EngineContext>, config: BridgeConfig) -> Self {
        let image = PixelBuffer::new(
            config.playback.initial_width,
            config.playback.initial_height,
        );
        Self::with_image(context, config, image)
    }
}

impl<I: ImageBuffer> Session<I> {
    pub fn with_image(context: Arc<EngineContext>, config: BridgeConfig, image: I) -> Self {
        let name = config
            .playback
            .name
            .clone()
            .unwrap_or_else(|| "session".to_string());

        Self {
            context,
            config,
            image,
            queue: Arc::new(EventQueue::new()),
            owns_queue: true,
            shared: Arc::new(SessionShared::new(name)),
            lease: None,
            token: None,
            frames: FrameAcquisition::new(),
            encoding: None,
        }
    }

    /// Deliver events through `queue` instead of a private one. Only
    /// possible before [`initialize`](Self::initialize).
    pub fn with_shared_queue(mut self, queue: Arc<EventQueue>) -> Self {
        if self.token.is_some() {
            warn!(
                "[{}] Cannot switch queues on an initialized session",
                self.shared.name
            );
            return self;
        }
        self.queue = queue;
        self.owns_queue = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn image(&self) -> &I {
        &self.image
    }

    pub fn state(&self) -> PipelineState {
        lock(&self.shared.core).status.state
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.shared.core).pipeline.is_some()
    }

    pub fn pipeline_id(&self) -> Option<PipelineId> {
        lock(&self.shared.core).pipeline.as_ref().map(|p| p.id())
    }

    pub fn qos_summary(&self) -> HealthSummary {
        self.shared.health.summary()
    }

    /// Acquire the engine, register the callback binding and create the
    /// native pipeline. A second call is a no-op.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state().is_destroyed() {
            return Err(BridgeError::Destroyed);
        }
        if self.lease.is_some() {
            debug!("[{}] Already initialized", self.shared.name);
            return Ok(());
        }

        let lease = self.context.acquire();
        if !self.context.is_active() {
            return Err(BridgeError::PipelineCreation(format!(
                "{}: engine is not running",
                self.shared.name
            )));
        }

        let target: Arc<dyn BindingTarget> = self.shared.clone();
        let token = binding::get_instance().register(self.queue.clone(), target);
        let pipeline = match NativePipeline::create(
            self.context.engine().clone(),
            &self.shared.name,
            bridge::marshaled_callbacks(),
            token.as_userdata(),
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                binding::get_instance().release(token);
                return Err(e);
            }
        };

        {
            let mut core = lock(&self.shared.core);
            core.pipeline = Some(pipeline);
            core.status = Status::default();
        }
        self.lease = Some(lease);
        self.token = Some(token);
        info!("[{}] Initialized (binding {})", self.shared.name, token);
        Ok(())
    }

    /// Run `f` against the live pipeline. Fails without reaching the engine
    /// once the session is destroyed.
    fn with_pipeline<R>(&self, f: impl FnOnce(&mut Status, &NativePipeline) -> R) -> Result<R> {
        let mut core = lock(&self.shared.core);
        let SessionCore { pipeline, status } = &mut *core;
        if status.state.is_destroyed() {
            return Err(BridgeError::Destroyed);
        }
        let pipeline = pipeline.as_ref().ok_or(BridgeError::NotInitialized)?;
        Ok(f(status, pipeline))
    }

    /// Release whatever media is loaded so a new setup starts clean.
    fn close_loaded(&self, pipeline: &NativePipeline) {
        if pipeline.is_loaded() || pipeline.is_playing() {
            debug!("[{}] Closing previous media", self.shared.name);
            pipeline.close();
        }
    }

    fn reset_stream(&mut self) {
        if let Some(binding) = self.token.and_then(|t| binding::get_instance().resolve(t)) {
            binding.rearm();
        }
        self.shared.health.reset();
        self.frames = FrameAcquisition::new();
    }

    /// Set up decoding of `uri` with the configured clock and crop settings.
    ///
    /// A negative stream index disables that stream. Problems with the media
    /// itself are reported later through the error observers.
    pub fn setup(&mut self, uri: &str, video_index: i32, audio_index: i32) -> Result<()> {
        let decoding = self.config.decoding(uri, video_index, audio_index);
        self.setup_with(decoding)
    }

    pub fn setup_with(&mut self, decoding: DecodingConfig) -> Result<()> {
        let looping = self.config.playback.looping;
        let valid = !decoding.uri.contains('\0');

        self.with_pipeline(|status, pipeline| {
            self.close_loaded(pipeline);
            status.direction = Some(Direction::Decoding);
            status.looping = looping;
            status.state = PipelineState::Configured;
            if valid {
                pipeline.setup_decoding(&decoding);
            }
        })?;
        self.encoding = None;
        self.reset_stream();

        if !valid && let Some(token) = self.token {
            trampoline::post_error(token, format!("Invalid URI {:?}", decoding.uri));
        }
        info!("[{}] Set up decoding of {}", self.shared.name, decoding.uri);
        Ok(())
    }

    /// Set up encoding of raw RGBA frames of `width` x `height` into `path`.
    pub fn setup_encoding(&mut self, path: impl Into<PathBuf>, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(BridgeError::Config(format!(
                "encoding size {}x{} is empty",
                width, height
            )));
        }
        let encoding = EncodingConfig {
            path: path.into(),
            width,
            height,
        };

        self.with_pipeline(|status, pipeline| {
            self.close_loaded(pipeline);
            pipeline.setup_encoding(&encoding);
            status.direction = Some(Direction::Encoding);
            status.looping = false;
            status.state = PipelineState::Configured;
        })?;
        info!(
            "[{}] Set up encoding to {} at {}x{}",
            self.shared.name,
            encoding.path.display(),
            width,
            height
        );
        self.encoding = Some(encoding);
        self.reset_stream();
        Ok(())
    }

    /// Apply `op` if the current state allows it. Returns whether anything
    /// reached the engine.
    fn transport(&self, op: Transport) -> Result<bool> {
        let volume = self.config.playback.volume;
        self.with_pipeline(|status, pipeline| {
            let Some(next) = status.state.transition(op) else {
                debug!(
                    "[{}] {:?} ignored while {}",
                    self.shared.name, op, status.state
                );
                return false;
            };

            match op {
                Transport::Play => {
                    pipeline.set_volume(volume);
                    pipeline.play();
                }
                Transport::Pause => pipeline.pause(),
                Transport::Stop => pipeline.stop(),
                Transport::Close => pipeline.close(),
            }
            debug!("[{}] {} -> {}", self.shared.name, status.state, next);
            status.state = next;
            true
        })
    }

    /// Start or resume. The next frame fires the start observers.
    pub fn play(&mut self) -> Result<()> {
        if self.transport(Transport::Play)? {
            self.frames.rearm();
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.transport(Transport::Pause).map(|_| ())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.transport(Transport::Stop).map(|_| ())
    }

    /// Release the media, stopping first if needed.
    pub fn close(&mut self) -> Result<()> {
        if self.state().is_active() {
            self.transport(Transport::Stop)?;
        }
        self.transport(Transport::Close).map(|_| ())
    }

    /// Initialize, set up the configured media and play it.
    pub fn start(&mut self) -> Result<()> {
        self.initialize()?;
        let playback = &self.config.playback;
        if playback.uri.is_empty() {
            return Err(BridgeError::Config("no media URI configured".into()));
        }
        let (uri, video, audio) = (
            playback.uri.clone(),
            playback.video_index,
            playback.audio_index,
        );
        self.setup(&uri, video, audio)?;
        self.play()
    }

    /// Per-tick entry point: pull the newest frame into the image, then run
    /// every engine event queued since the last tick.
    pub fn advance(&mut self) -> Result<Tick> {
        let bitrate_limit = self.config.playback.adaptive_bitrate_limit;
        let frame = {
            let mut core = lock(&self.shared.core);
            let SessionCore { pipeline, status } = &mut *core;
            if status.state.is_destroyed() {
                return Err(BridgeError::Destroyed);
            }
            let pipeline = pipeline.as_ref().ok_or(BridgeError::NotInitialized)?;

            if status.direction == Some(Direction::Decoding) && status.state.is_configured() {
                let poll = self.frames.poll(pipeline, &mut self.image);
                if let FramePoll::Frame { first, .. } = poll {
                    self.shared.health.record_frame();
                    if first && bitrate_limit != 1.0 {
                        pipeline.set_adaptive_bitrate_limit(bitrate_limit);
                    }
                }
                poll
            } else {
                FramePoll::Idle
            }
        };

        if let FramePoll::Frame {
            descriptor,
            first: true,
            ..
        } = frame
        {
            info!("[{}] First frame {}", self.shared.name, descriptor);
            self.shared.observers.notify_start();
        }

        let events = self.queue.drain_and_execute_all();
        Ok(Tick { frame, events })
    }

    fn frame_len_check(&self, status: &Status, len: usize) -> Result<()> {
        match status.direction {
            Some(Direction::Encoding) => {}
            Some(Direction::Decoding) => {
                return Err(BridgeError::WrongDirection {
                    expected: "encoding",
                });
            }
            None => return Err(BridgeError::NotConfigured),
        }
        let Some(encoding) = self.encoding.as_ref().filter(|_| status.state.is_configured())
        else {
            return Err(BridgeError::NotConfigured);
        };
        if len != encoding.frame_len() {
            return Err(BridgeError::FrameSize {
                expected: encoding.frame_len(),
                actual: len,
            });
        }
        Ok(())
    }

    /// Push one RGBA frame of the configured encoding size. The slice is only
    /// borrowed for the call.
    pub fn consume_image(&self, data: &[u8]) -> Result<()> {
        self.with_pipeline(|status, pipeline| -> Result<()> {
            self.frame_len_check(status, data.len())?;
            pipeline.consume_image(data);
            Ok(())
        })?
    }

    /// Like [`consume_image`](Self::consume_image), reconfiguring the
    /// encoder first when the source size changed.
    pub fn consume_image_sized(&mut self, width: u32, height: u32, data: &[u8]) -> Result<()> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(BridgeError::FrameSize {
                expected,
                actual: data.len(),
            });
        }

        if let Some(encoding) = &self.encoding
            && (encoding.width, encoding.height) != (width, height)
        {
            info!(
                "[{}] Source size changed {}x{} -> {}x{}, reconfiguring encoder",
                self.shared.name, encoding.width, encoding.height, width, height
            );
            let path = encoding.path.clone();
            self.setup_encoding(path, width, height)?;
            self.play()?;
        }
        self.consume_image(data)
    }

    /// Seconds.
    pub fn duration(&self) -> Result<f64> {
        self.with_pipeline(|_, pipeline| pipeline.duration())
    }

    /// Seconds.
    pub fn position(&self) -> Result<f64> {
        self.with_pipeline(|_, pipeline| pipeline.position())
    }

    /// Seconds. The seek completes asynchronously.
    pub fn set_position(&self, seconds: f64) -> Result<()> {
        self.with_pipeline(|_, pipeline| pipeline.set_position(seconds))
    }

    /// Nanoseconds, as configured. The engine has no way to read it back.
    pub fn basetime(&self) -> u64 {
        self.config.synchronization.base_time
    }

    pub fn set_basetime(&mut self, nanos: u64) -> Result<()> {
        self.with_pipeline(|_, pipeline| pipeline.set_basetime(nanos))?;
        self.config.synchronization.base_time = nanos;
        Ok(())
    }

    /// 0 (mute) to 1 (max). Also used by every later `play`.
    pub fn set_volume(&mut self, volume: f64) -> Result<()> {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.with_pipeline(|_, pipeline| pipeline.set_volume(volume))?;
        self.config.playback.volume = volume;
        Ok(())
    }

    /// 0 (lowest quality) to 1 (highest). Applied now if frames are already
    /// flowing, otherwise on the first frame after `play`.
    pub fn set_adaptive_bitrate_limit(&mut self, limit: f32) -> Result<()> {
        let limit = if limit.is_nan() { 1.0 } else { limit.clamp(0.0, 1.0) };
        let streaming = self.frames.last().is_some();
        self.with_pipeline(|status, pipeline| {
            if streaming && status.state == PipelineState::Playing {
                pipeline.set_adaptive_bitrate_limit(limit);
            }
        })?;
        self.config.playback.adaptive_bitrate_limit = limit;
        Ok(())
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.config.playback.looping = looping;
        lock(&self.shared.core).status.looping = looping;
    }

    /// As reported by the engine. False when there is no pipeline.
    pub fn is_playing(&self) -> bool {
        self.with_pipeline(|_, pipeline| pipeline.is_playing())
            .unwrap_or(false)
    }

    /// As reported by the engine. False when there is no pipeline.
    pub fn is_loaded(&self) -> bool {
        self.with_pipeline(|_, pipeline| pipeline.is_loaded())
            .unwrap_or(false)
    }

    /// Called on the consumer thread with the first frame after each `play`.
    pub fn on_start(&self, observer: impl FnMut() + Send + 'static) {
        self.shared.observers.add_start(Box::new(observer));
    }

    /// Called on the consumer thread when the stream ends.
    pub fn on_finish(&self, observer: impl FnMut() + Send + 'static) {
        self.shared.observers.add_finish(Box::new(observer));
    }

    /// Called on the consumer thread with the engine's diagnostic.
    pub fn on_error(&self, observer: impl FnMut(&str) + Send + 'static) {
        self.shared.observers.add_error(Box::new(observer));
    }

    pub fn on_qos(&self, observer: impl FnMut(&QosData) + Send + 'static) {
        self.shared.observers.add_qos(Box::new(observer));
    }

    /// Block until the engine flushed an encoding pipeline. Returns false if
    /// the configured timeout ran out first.
    fn wait_for_end_of_stream(&self, pipeline: &NativePipeline) -> bool {
        let Some(binding) = self.token.and_then(|t| binding::get_instance().resolve(t)) else {
            return true;
        };

        pipeline.stop_encoding();
        let interval = self.config.teardown.poll_interval();
        let timeout = self.config.teardown.timeout();
        let started = Instant::now();
        info!("[{}] Waiting for end of stream", self.shared.name);

        while !(binding.eos_seen() || binding.error_seen()) {
            if let Some(timeout) = timeout
                && started.elapsed() >= timeout
            {
                warn!(
                    "[{}] No end of stream after {:?}",
                    self.shared.name, timeout
                );
                return false;
            }
            thread::sleep(interval);
        }

        debug!(
            "[{}] End of stream after {:?}",
            self.shared.name,
            started.elapsed()
        );
        true
    }

    /// Release the pipeline, the binding and the engine lease. Idempotent.
    ///
    /// A playing or paused encoder is flushed first and this blocks until its
    /// end of stream arrives. Any other pipeline is released immediately.
    /// Events still queued for this session are discarded.
    pub fn destroy(&mut self) {
        let (pipeline, direction, previous) = {
            let mut core = lock(&self.shared.core);
            if core.status.state.is_destroyed() {
                return;
            }
            let previous = core.status.state;
            core.status.state = PipelineState::Destroyed;
            (core.pipeline.take(), core.status.direction, previous)
        };

        if let Some(pipeline) = pipeline {
            // Only a running encoder can still hold buffers and deliver EOS.
            // Stopped and closed pipelines never post it.
            let running_encoder =
                direction == Some(Direction::Encoding) && previous.is_active();
            if running_encoder && previous == PipelineState::Paused {
                pipeline.play();
            }
            let flushed = !running_encoder || self.wait_for_end_of_stream(&pipeline);

            if let Some(token) = self.token.take() {
                binding::get_instance().release(token);
            }
            if flushed {
                pipeline.destroy();
            } else {
                pipeline.leak();
            }
            info!("[{}] Destroyed. {}", self.shared.name, self.shared.health.summary());
        }

        if let Some(token) = self.token.take() {
            binding::get_instance().release(token);
        }
        if self.owns_queue {
            self.queue.close();
        }
        drop(self.lease.take());
    }
}

impl<I: ImageBuffer> Drop for Session<I> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<I: ImageBuffer> std::fmt::Debug for Session<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("binding", &self.token)
            .field("image", &self.image.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DebugParams;
    use crate::engine::SimulatedEngine;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn session_with(
        engine: SimulatedEngine,
        config: BridgeConfig,
    ) -> (Arc<SimulatedEngine>, Arc<EngineContext>, Session) {
        let engine = Arc::new(engine);
        let context = EngineContext::new(engine.clone(), &config.debug);
        let session = Session::new(context.clone(), config);
        (engine, context, session)
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_qos_and_looping_finish_end_to_end() {
        let mut config = BridgeConfig::default();
        config.playback.looping = true;
        let (engine, _context, mut session) = session_with(SimulatedEngine::new(), config);

        session.initialize().unwrap();
        session.setup("file:///a.mp4", 0, -1).unwrap();
        session.play().unwrap();
        let id = session.pipeline_id().unwrap();

        let records = Arc::new(Mutex::new(Vec::new()));
        let r = records.clone();
        session.on_qos(move |qos| r.lock().unwrap().push(*qos));
        let (finishes, on_finish) = counter();
        session.on_finish(on_finish);

        engine
            .emit_qos(
                id,
                QosData {
                    processed: 100,
                    dropped: 3,
                    ..Default::default()
                },
            )
            .join()
            .unwrap();
        assert!(records.lock().unwrap().is_empty());

        let tick = session.advance().unwrap();
        assert_eq!(tick.events, 1);
        let seen = records.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].dropped, 3);
        assert_eq!(session.qos_summary().engine_dropped, 3);

        session.set_position(4.0).unwrap();
        engine.emit_eos(id).join().unwrap();
        assert_eq!(finishes.load(Ordering::SeqCst), 0);

        session.advance().unwrap();
        assert_eq!(finishes.load(Ordering::SeqCst), 1);
        assert_eq!(session.position().unwrap(), 0.0);
        assert_eq!(session.state(), PipelineState::Playing);
    }

    #[test]
    fn test_finish_without_loop_keeps_position() {
        let (engine, _context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        session.initialize().unwrap();
        session.setup("file:///a.mp4", 0, 0).unwrap();
        session.play().unwrap();
        session.set_position(4.0).unwrap();

        engine.emit_eos(session.pipeline_id().unwrap()).join().unwrap();
        session.advance().unwrap();
        assert_eq!(session.position().unwrap(), 4.0);
    }

    #[test]
    fn test_start_fires_once_per_play_and_applies_bitrate() {
        let mut config = BridgeConfig::default();
        config.playback.adaptive_bitrate_limit = 0.5;
        let (engine, _context, mut session) = session_with(SimulatedEngine::new(), config);
        let (starts, on_start) = counter();
        session.on_start(on_start);

        session.initialize().unwrap();
        session.setup("file:///a.mp4", 0, 0).unwrap();
        session.play().unwrap();
        let id = session.pipeline_id().unwrap();

        // Nothing decoded yet
        session.advance().unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 0);
        assert_eq!(engine.call_count(id, "set_adaptive_bitrate_limit"), 0);

        engine.push_frame(id, 320, 240, [1, 2, 3, 4]);
        let tick = session.advance().unwrap();
        assert!(matches!(tick.frame, FramePoll::Frame { first: true, .. }));
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(engine.snapshot(id).unwrap().adaptive_bitrate_limit, 0.5);
        assert_eq!(session.image().size(), (320, 240));

        engine.push_frame(id, 320, 240, [1, 2, 3, 4]);
        session.advance().unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(engine.call_count(id, "set_adaptive_bitrate_limit"), 1);

        session.pause().unwrap();
        session.play().unwrap();
        engine.push_frame(id, 320, 240, [1, 2, 3, 4]);
        session.advance().unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_bitrate_limit_is_not_sent() {
        let (engine, _context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        session.initialize().unwrap();
        session.setup("file:///a.mp4", 0, 0).unwrap();
        session.play().unwrap();
        let id = session.pipeline_id().unwrap();

        engine.push_frame(id, 8, 8, [0; 4]);
        session.advance().unwrap();
        assert_eq!(engine.call_count(id, "set_adaptive_bitrate_limit"), 0);
    }

    #[test]
    fn test_transport_noops() {
        let (engine, _context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        session.initialize().unwrap();
        let id = session.pipeline_id().unwrap();

        // Nothing to play yet
        session.play().unwrap();
        assert_eq!(session.state(), PipelineState::Unloaded);
        assert_eq!(engine.call_count(id, "play"), 0);

        session.setup("file:///a.mp4", 0, 0).unwrap();
        session.pause().unwrap();
        assert_eq!(session.state(), PipelineState::Configured);
        assert_eq!(engine.call_count(id, "pause"), 0);

        session.play().unwrap();
        session.play().unwrap();
        assert_eq!(session.state(), PipelineState::Playing);
        assert_eq!(engine.call_count(id, "play"), 1);
        assert_eq!(engine.snapshot(id).unwrap().volume, 1.0);

        session.close().unwrap();
        assert_eq!(session.state(), PipelineState::Closed);
        assert_eq!(engine.call_count(id, "stop"), 1);
        assert_eq!(engine.call_count(id, "close"), 1);
    }

    #[test]
    fn test_setup_closes_loaded_media() {
        let (engine, _context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        session.initialize().unwrap();
        let id = session.pipeline_id().unwrap();

        session.setup("file:///a.mp4", 0, 0).unwrap();
        assert_eq!(engine.call_count(id, "close"), 0);
        session.play().unwrap();
        session.advance().unwrap();
        assert!(session.is_playing());

        session.setup("file:///b.mp4", 0, 0).unwrap();
        assert_eq!(engine.call_count(id, "close"), 1);
        assert_eq!(session.state(), PipelineState::Configured);
        assert_eq!(engine.snapshot(id).unwrap().uri.as_deref(), Some("file:///b.mp4"));
    }

    #[test]
    fn test_destroyed_session_never_reaches_engine() {
        let (engine, context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        session.initialize().unwrap();
        session.setup("file:///a.mp4", 0, 0).unwrap();
        let id = session.pipeline_id().unwrap();

        session.destroy();
        assert_eq!(session.state(), PipelineState::Destroyed);
        assert_eq!(context.ref_count(), 0);
        assert_eq!(engine.shutdown_count(), 1);

        assert!(matches!(session.play(), Err(BridgeError::Destroyed)));
        assert!(matches!(session.pause(), Err(BridgeError::Destroyed)));
        assert!(matches!(session.stop(), Err(BridgeError::Destroyed)));
        assert!(matches!(session.close(), Err(BridgeError::Destroyed)));
        assert!(matches!(session.set_position(1.0), Err(BridgeError::Destroyed)));
        assert!(matches!(session.advance(), Err(BridgeError::Destroyed)));
        assert!(matches!(session.initialize(), Err(BridgeError::Destroyed)));
        assert!(!session.is_playing());

        assert_eq!(engine.call_count(id, "play"), 0);
        assert_eq!(engine.call_count(id, "set_position"), 0);
        assert_eq!(engine.call_count(id, "destroy"), 1);

        // Idempotent
        session.destroy();
        assert_eq!(engine.call_count(id, "destroy"), 1);
    }

    #[test]
    fn test_uninitialized_session_rejects_calls() {
        let (_engine, _context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        assert!(matches!(
            session.setup("file:///a.mp4", 0, 0),
            Err(BridgeError::NotInitialized)
        ));
        assert!(matches!(session.advance(), Err(BridgeError::NotInitialized)));
        assert!(matches!(
            session.consume_image(&[]),
            Err(BridgeError::NotInitialized)
        ));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (engine, context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        session.initialize().unwrap();
        session.initialize().unwrap();
        assert_eq!(context.ref_count(), 1);
        assert_eq!(engine.pipeline_count(), 1);
        assert_eq!(engine.initialize_count(), 1);
    }

    #[test]
    fn test_failed_creation_releases_engine() {
        let (engine, context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        engine.fail_next_create();

        assert!(matches!(
            session.initialize(),
            Err(BridgeError::PipelineCreation(_))
        ));
        assert_eq!(context.ref_count(), 0);
        assert!(!session.is_initialized());

        session.initialize().unwrap();
        assert!(session.is_initialized());
    }

    #[test]
    fn test_drop_releases_everything() {
        let (engine, context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        session.initialize().unwrap();
        let id = session.pipeline_id().unwrap();
        drop(session);

        assert_eq!(context.ref_count(), 0);
        assert_eq!(engine.call_count(id, "destroy"), 1);
        assert_eq!(engine.pipeline_count(), 0);
    }

    #[test]
    fn test_event_queued_before_destroy_is_dropped() {
        let queue = Arc::new(EventQueue::new());
        let (engine, _context, session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        let mut session = session.with_shared_queue(queue.clone());
        let (finishes, on_finish) = counter();
        session.on_finish(on_finish);

        session.initialize().unwrap();
        session.setup("file:///a.mp4", 0, 0).unwrap();
        engine.emit_eos(session.pipeline_id().unwrap()).join().unwrap();
        assert_eq!(queue.pending_len(), 1);

        session.destroy();
        assert!(!queue.is_closed());
        assert_eq!(queue.drain_and_execute_all(), 1);
        assert_eq!(finishes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sessions_can_share_a_queue() {
        let queue = Arc::new(EventQueue::new());
        let engine = Arc::new(SimulatedEngine::new());
        let context = EngineContext::new(engine.clone(), &Default::default());

        let mut a = Session::new(context.clone(), BridgeConfig::default())
            .with_shared_queue(queue.clone());
        let mut b = Session::new(context.clone(), BridgeConfig::default())
            .with_shared_queue(queue.clone());
        a.initialize().unwrap();
        b.initialize().unwrap();
        assert_eq!(context.ref_count(), 2);
        assert_eq!(engine.initialize_count(), 1);

        let (a_errors, mut on_a) = counter();
        a.on_error(move |_| on_a());
        let (b_errors, mut on_b) = counter();
        b.on_error(move |_| on_b());

        engine.emit_error(a.pipeline_id().unwrap(), "a failed").join().unwrap();
        engine.emit_error(b.pipeline_id().unwrap(), "b failed").join().unwrap();

        assert_eq!(a.advance().unwrap().events, 2);
        assert_eq!(a_errors.load(Ordering::SeqCst), 1);
        assert_eq!(b_errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bad_uri_reports_error_asynchronously() {
        let (engine, _context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        session.on_error(move |msg| e.lock().unwrap().push(msg.to_string()));

        session.initialize().unwrap();
        session.setup("not a uri", 0, 0).unwrap();
        session.play().unwrap();
        engine.settle();
        assert!(errors.lock().unwrap().is_empty());

        session.advance().unwrap();
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert!(errors.lock().unwrap()[0].contains("not a uri"));
        assert_eq!(session.state(), PipelineState::Stopped);
        assert_eq!(session.qos_summary().errors, 1);

        // Recoverable through a new setup
        session.setup("file:///a.mp4", 0, 0).unwrap();
        assert_eq!(session.state(), PipelineState::Configured);
        assert_eq!(session.qos_summary().errors, 0);
    }

    #[test]
    fn test_uri_with_nul_never_reaches_engine() {
        let (engine, _context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        let (errors, mut on_error) = counter();
        session.on_error(move |_| on_error());

        session.initialize().unwrap();
        session.setup("file:///a\0b", 0, 0).unwrap();
        let id = session.pipeline_id().unwrap();
        assert_eq!(engine.call_count(id, "setup_decoding"), 0);

        session.advance().unwrap();
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), PipelineState::Stopped);
    }

    #[test]
    fn test_encoding_destroy_waits_for_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SimulatedEngine::new().with_eos_delay(Duration::from_millis(150));
        let (engine, _context, mut session) = session_with(engine, BridgeConfig::default());

        session.initialize().unwrap();
        session.setup_encoding(dir.path().join("out.mp4"), 4, 2).unwrap();
        session.play().unwrap();
        let frame = [0x7fu8; 32];
        for _ in 0..5 {
            session.consume_image(&frame).unwrap();
        }
        let id = session.pipeline_id().unwrap();
        assert_eq!(engine.snapshot(id).unwrap().consumed, 5);

        let started = Instant::now();
        session.destroy();
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(engine.call_count(id, "stop_encoding"), 1);
        assert_eq!(engine.call_count(id, "destroy"), 1);
    }

    #[test]
    fn test_encoding_destroy_timeout_leaks_handle() {
        let mut config = BridgeConfig::default();
        config.teardown.eos_timeout_ms = Some(20);
        let engine = SimulatedEngine::new().with_eos_delay(Duration::from_millis(300));
        let (engine, context, mut session) = session_with(engine, config);

        session.initialize().unwrap();
        session.setup_encoding("out.mp4", 2, 2).unwrap();
        session.play().unwrap();
        let id = session.pipeline_id().unwrap();

        session.destroy();
        assert_eq!(engine.call_count(id, "stop_encoding"), 1);
        assert_eq!(engine.call_count(id, "destroy"), 0);
        assert_eq!(context.ref_count(), 0);
        engine.settle();
    }

    #[test]
    fn test_idle_encoder_is_released_without_flush() {
        let engine = Arc::new(SimulatedEngine::new().with_eos_delay(Duration::from_millis(400)));
        let context = EngineContext::new(engine.clone(), &DebugParams::default());

        // Closed after playing.
        let mut closed = Session::new(context.clone(), BridgeConfig::default());
        closed.initialize().unwrap();
        closed.setup_encoding("closed.mp4", 2, 2).unwrap();
        closed.play().unwrap();
        closed.consume_image(&[0; 16]).unwrap();
        closed.stop().unwrap();
        closed.close().unwrap();
        let closed_id = closed.pipeline_id().unwrap();

        let started = Instant::now();
        closed.destroy();
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(engine.call_count(closed_id, "stop_encoding"), 0);
        assert_eq!(engine.call_count(closed_id, "destroy"), 1);

        // Stopped, and configured but never started.
        let mut stopped = Session::new(context.clone(), BridgeConfig::default());
        stopped.initialize().unwrap();
        stopped.setup_encoding("stopped.mp4", 2, 2).unwrap();
        stopped.play().unwrap();
        stopped.stop().unwrap();
        let stopped_id = stopped.pipeline_id().unwrap();

        let mut idle = Session::new(context.clone(), BridgeConfig::default());
        idle.initialize().unwrap();
        idle.setup_encoding("idle.mp4", 2, 2).unwrap();
        let idle_id = idle.pipeline_id().unwrap();

        let started = Instant::now();
        drop(stopped);
        drop(idle);
        assert!(started.elapsed() < Duration::from_millis(200));
        for id in [stopped_id, idle_id] {
            assert_eq!(engine.call_count(id, "stop_encoding"), 0);
            assert_eq!(engine.call_count(id, "destroy"), 1);
        }
        assert_eq!(context.ref_count(), 0);
    }

    #[test]
    fn test_paused_encoder_resumes_to_flush() {
        let engine = SimulatedEngine::new().with_eos_delay(Duration::from_millis(50));
        let (engine, _context, mut session) = session_with(engine, BridgeConfig::default());
        session.initialize().unwrap();
        session.setup_encoding("paused.mp4", 2, 2).unwrap();
        session.play().unwrap();
        session.consume_image(&[0; 16]).unwrap();
        session.pause().unwrap();
        let id = session.pipeline_id().unwrap();

        session.destroy();
        assert_eq!(engine.call_count(id, "play"), 2);
        assert_eq!(engine.call_count(id, "stop_encoding"), 1);
        assert_eq!(engine.call_count(id, "destroy"), 1);
    }

    #[test]
    fn test_consume_image_validation() {
        let (_engine, _context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        session.initialize().unwrap();
        assert!(matches!(
            session.consume_image(&[0; 4]),
            Err(BridgeError::NotConfigured)
        ));

        session.setup("file:///a.mp4", 0, 0).unwrap();
        assert!(matches!(
            session.consume_image(&[0; 4]),
            Err(BridgeError::WrongDirection { expected: "encoding" })
        ));

        session.setup_encoding("out.mp4", 2, 2).unwrap();
        assert!(matches!(
            session.consume_image(&[0; 15]),
            Err(BridgeError::FrameSize { expected: 16, actual: 15 })
        ));
        session.consume_image(&[0; 16]).unwrap();

        assert!(matches!(
            session.setup_encoding("out.mp4", 0, 2),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn test_size_change_reconfigures_encoder() {
        let (engine, _context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        session.initialize().unwrap();
        session.setup_encoding("capture.mp4", 4, 2).unwrap();
        session.play().unwrap();
        let id = session.pipeline_id().unwrap();

        session.consume_image_sized(4, 2, &[0; 32]).unwrap();
        assert_eq!(engine.call_count(id, "setup_encoding"), 1);

        session.consume_image_sized(8, 4, &[1; 128]).unwrap();
        assert_eq!(engine.call_count(id, "setup_encoding"), 2);
        let snapshot = engine.snapshot(id).unwrap();
        assert_eq!(snapshot.encoding, Some((PathBuf::from("capture.mp4"), 8, 4)));
        assert_eq!(snapshot.consumed, 1);
        assert_eq!(session.state(), PipelineState::Playing);

        assert!(matches!(
            session.consume_image_sized(8, 4, &[1; 100]),
            Err(BridgeError::FrameSize { expected: 128, actual: 100 })
        ));
    }

    #[test]
    fn test_start_uses_configured_media() {
        let mut config = BridgeConfig::default();
        config.playback.uri = "file:///configured.mp4".into();
        config.playback.audio_index = -1;
        config.playback.volume = 0.25;
        let (engine, _context, mut session) = session_with(SimulatedEngine::new(), config);

        session.start().unwrap();
        let id = session.pipeline_id().unwrap();
        assert_eq!(session.state(), PipelineState::Playing);
        let snapshot = engine.snapshot(id).unwrap();
        assert_eq!(snapshot.uri.as_deref(), Some("file:///configured.mp4"));
        assert_eq!(snapshot.decoding.unwrap().audio_index, -1);
        assert_eq!(snapshot.volume, 0.25);
    }

    #[test]
    fn test_start_without_uri_fails() {
        let (_engine, _context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        assert!(matches!(session.start(), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_parameter_setters() {
        let (engine, _context, mut session) =
            session_with(SimulatedEngine::new(), BridgeConfig::default());
        session.initialize().unwrap();
        session.setup("file:///a.mp4", 0, 0).unwrap();
        let id = session.pipeline_id().unwrap();

        session.set_basetime(1_000_000).unwrap();
        assert_eq!(session.basetime(), 1_000_000);
        assert_eq!(engine.snapshot(id).unwrap().basetime, 1_000_000);

        session.set_volume(2.0).unwrap();
        assert_eq!(session.config().playback.volume, 1.0);
        session.set_volume(0.3).unwrap();
        assert_eq!(engine.snapshot(id).unwrap().volume, 0.3);

        // Deferred until frames flow
        session.set_adaptive_bitrate_limit(0.4).unwrap();
        assert_eq!(engine.call_count(id, "set_adaptive_bitrate_limit"), 0);
        assert_eq!(session.config().playback.adaptive_bitrate_limit, 0.4);

        assert_eq!(session.duration().unwrap(), 10.0);
    }
}
