//! In-process stand-in for the native engine
//!
//! Behaves like the real library where the host can observe it: callbacks
//! arrive on threads the engine owns, `grab_frame` only reports frames newer
//! than the last grab, and end-of-stream after `stop_encoding` comes later,
//! from another thread, and only if the encoder was running. Everything it
//! was asked to do is recorded so tests can inspect it. Only the latest
//! blits are kept.

use std::collections::HashMap;
use std::ffi::{CString, c_void};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace};

use super::{Engine, LogSinkFn, NativeCallbacks, PipelineHandle, PipelineId};
use crate::config::DecodingConfig;
use crate::display::CpuSurface;
use crate::pipeline::{Direction, QosData};
use crate::utils::lock;

/// A frame the simulated decoder has ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimFrame {
    pub width: u32,
    pub height: u32,
    /// RGBA fill written by `blit_image`.
    pub color: [u8; 4],
}

/// One `blit_image` call: frame size and destination surface size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitRecord {
    pub frame: (u32, u32),
    pub surface: (u32, u32),
}

/// Everything known about one simulated pipeline.
#[derive(Debug, Clone)]
pub struct SimPipeline {
    pub name: String,
    pub userdata: usize,
    pub direction: Option<Direction>,
    pub uri: Option<String>,
    pub decoding: Option<DecodingConfig>,
    pub encoding: Option<(PathBuf, u32, u32)>,
    pub loaded: bool,
    pub playing: bool,
    pub play_requested: bool,
    pub pending_frame: Option<SimFrame>,
    pub grabbed: Option<SimFrame>,
    pub frames_grabbed: u64,
    pub blits: Vec<BlitRecord>,
    pub consumed: usize,
    pub last_consumed: Option<Bytes>,
    pub position: f64,
    pub duration: f64,
    pub volume: f64,
    pub basetime: u64,
    pub adaptive_bitrate_limit: f32,
    pub eos_sent: bool,
}

struct SimEntry {
    pipeline: SimPipeline,
    callbacks: NativeCallbacks,
}

/// Self-driving frame source for playing pipelines.
#[derive(Debug, Clone, Copy)]
struct AutoFrames {
    width: u32,
    height: u32,
    /// Seconds of media per grabbed frame
    step: f64,
    qos_every: u64,
}

#[derive(Default)]
struct SimState {
    next_id: usize,
    pipelines: HashMap<usize, SimEntry>,
    calls: HashMap<(usize, &'static str), usize>,
    initialized: usize,
    shutdowns: usize,
    active: bool,
    debug: Option<String>,
    log_sink: Option<LogSinkFn>,
}

pub struct SimulatedEngine {
    state: Mutex<SimState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    eos_delay: Duration,
    auto_frames: Option<AutoFrames>,
    duration: f64,
    fail_next_create: AtomicBool,
}

const UNKNOWN_ID: usize = 0;

/// Blit records kept per pipeline.
pub const BLIT_HISTORY: usize = 64;

impl SimulatedEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                next_id: 1,
                ..Default::default()
            }),
            workers: Mutex::new(Vec::new()),
            eos_delay: Duration::ZERO,
            auto_frames: None,
            duration: 10.0,
            fail_next_create: AtomicBool::new(false),
        }
    }

    /// Delay between `stop_encoding` and the end-of-stream callback.
    pub fn with_eos_delay(mut self, delay: Duration) -> Self {
        self.eos_delay = delay;
        self
    }

    /// Produce a `width` x `height` frame on every grab while playing,
    /// advancing the position by `step` seconds and finishing at the end of
    /// the stream.
    pub fn with_auto_frames(mut self, width: u32, height: u32, step: f64) -> Self {
        self.auto_frames = Some(AutoFrames {
            width,
            height,
            step,
            qos_every: 30,
        });
        self
    }

    /// Stream length reported for every pipeline, in seconds.
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    /// Make the next `create` fail.
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    pub fn initialize_count(&self) -> usize {
        lock(&self.state).initialized
    }

    pub fn shutdown_count(&self) -> usize {
        lock(&self.state).shutdowns
    }

    pub fn debug_string(&self) -> Option<String> {
        lock(&self.state).debug.clone()
    }

    pub fn has_log_sink(&self) -> bool {
        lock(&self.state).log_sink.is_some()
    }

    /// Number of live pipelines.
    pub fn pipeline_count(&self) -> usize {
        lock(&self.state).pipelines.len()
    }

    pub fn snapshot(&self, id: PipelineId) -> Option<SimPipeline> {
        lock(&self.state)
            .pipelines
            .get(&id.0)
            .map(|entry| entry.pipeline.clone())
    }

    /// How often `call` reached the engine for `id`, including after destroy.
    pub fn call_count(&self, id: PipelineId, call: &'static str) -> usize {
        lock(&self.state)
            .calls
            .get(&(id.0, call))
            .copied()
            .unwrap_or(0)
    }

    /// Make a decoded frame available to the next `grab_frame`.
    pub fn push_frame(&self, id: PipelineId, width: u32, height: u32, color: [u8; 4]) {
        if let Some(entry) = lock(&self.state).pipelines.get_mut(&id.0) {
            entry.pipeline.pending_frame = Some(SimFrame {
                width,
                height,
                color,
            });
        }
    }

    /// Fire end-of-stream from an engine thread.
    pub fn emit_eos(&self, id: PipelineId) -> JoinHandle<()> {
        let target = self.callback_target(id);
        thread::spawn(move || {
            if let Some((callbacks, userdata)) = target
                && let Some(eos) = callbacks.on_eos
            {
                eos(userdata as *mut c_void);
            }
        })
    }

    /// Fire an error from an engine thread.
    pub fn emit_error(&self, id: PipelineId, message: &str) -> JoinHandle<()> {
        let target = self.callback_target(id);
        let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
        thread::spawn(move || {
            if let Some((callbacks, userdata)) = target
                && let Some(error) = callbacks.on_error
            {
                error(userdata as *mut c_void, message.as_ptr());
            }
        })
    }

    /// Fire a QoS report from an engine thread.
    pub fn emit_qos(&self, id: PipelineId, qos: QosData) -> JoinHandle<()> {
        let target = self.callback_target(id);
        thread::spawn(move || {
            if let Some((callbacks, userdata)) = target {
                fire_qos(callbacks, userdata, qos);
            }
        })
    }

    /// Wait for every callback thread the engine started on its own.
    pub fn settle(&self) {
        let workers = std::mem::take(&mut *lock(&self.workers));
        for worker in workers {
            let _ = worker.join();
        }
    }

    fn callback_target(&self, id: PipelineId) -> Option<(NativeCallbacks, usize)> {
        lock(&self.state)
            .pipelines
            .get(&id.0)
            .map(|entry| (entry.callbacks, entry.pipeline.userdata))
    }

    fn spawn_worker(&self, f: impl FnOnce() + Send + 'static) {
        let mut workers = lock(&self.workers);
        workers.retain(|worker| !worker.is_finished());
        workers.push(thread::spawn(f));
    }

    /// Callback threads not yet joined by [`settle`](Self::settle).
    pub fn pending_workers(&self) -> usize {
        lock(&self.workers).len()
    }

    fn with_pipeline<R>(
        &self,
        handle: &PipelineHandle,
        call: &'static str,
        f: impl FnOnce(&mut SimEntry) -> R,
    ) -> Option<R> {
        let mut state = lock(&self.state);
        *state.calls.entry((handle.id().0, call)).or_default() += 1;
        state.pipelines.get_mut(&handle.id().0).map(f)
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn fire_qos(callbacks: NativeCallbacks, userdata: usize, qos: QosData) {
    if let Some(on_qos) = callbacks.on_qos {
        on_qos(
            userdata as *mut c_void,
            qos.jitter,
            qos.running_time,
            qos.stream_time,
            qos.timestamp,
            qos.proportion,
            qos.processed,
            qos.dropped,
        );
    }
}

impl Engine for SimulatedEngine {
    fn initialize(&self, debug: Option<&str>, log_sink: Option<LogSinkFn>) -> bool {
        {
            let mut state = lock(&self.state);
            state.initialized += 1;
            state.active = true;
            state.debug = debug.map(str::to_string);
            state.log_sink = log_sink;
        }
        if let Some(sink) = log_sink {
            sink(3, c"simulated engine initialized".as_ptr());
        }
        true
    }

    fn shutdown(&self) {
        let mut state = lock(&self.state);
        state.shutdowns += 1;
        state.active = false;
        state.log_sink = None;
    }

    fn is_active(&self) -> bool {
        lock(&self.state).active
    }

    fn create(
        &self,
        name: &str,
        callbacks: NativeCallbacks,
        userdata: usize,
    ) -> Option<PipelineHandle> {
        let mut state = lock(&self.state);
        *state.calls.entry((UNKNOWN_ID, "create")).or_default() += 1;
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return None;
        }

        let id = state.next_id;
        state.next_id += 1;
        state.pipelines.insert(
            id,
            SimEntry {
                pipeline: SimPipeline {
                    name: name.to_string(),
                    userdata,
                    direction: None,
                    uri: None,
                    decoding: None,
                    encoding: None,
                    loaded: false,
                    playing: false,
                    play_requested: false,
                    pending_frame: None,
                    grabbed: None,
                    frames_grabbed: 0,
                    blits: Vec::new(),
                    consumed: 0,
                    last_consumed: None,
                    position: 0.0,
                    duration: self.duration,
                    volume: 1.0,
                    basetime: 0,
                    adaptive_bitrate_limit: 1.0,
                    eos_sent: false,
                },
                callbacks,
            },
        );
        debug!("sim: created pipeline {} ({})", id, name);
        PipelineHandle::from_raw(id as *mut c_void)
    }

    fn destroy(&self, handle: PipelineHandle) {
        let mut state = lock(&self.state);
        *state.calls.entry((handle.id().0, "destroy")).or_default() += 1;
        state.pipelines.remove(&handle.id().0);
    }

    fn setup_decoding(&self, handle: &PipelineHandle, config: &DecodingConfig) {
        let failure = self
            .with_pipeline(handle, "setup_decoding", |entry| {
                let p = &mut entry.pipeline;
                p.direction = Some(Direction::Decoding);
                p.uri = Some(config.uri.clone());
                p.decoding = Some(config.clone());
                p.loaded = config.uri.contains("://");
                p.playing = false;
                p.play_requested = false;
                p.position = 0.0;
                p.eos_sent = false;
                p.basetime = config.base_time;
                (!p.loaded).then_some((entry.callbacks, p.userdata))
            })
            .flatten();

        if let Some((callbacks, userdata)) = failure {
            let message = CString::new(format!("Could not open resource {}", config.uri))
                .unwrap_or_default();
            self.spawn_worker(move || {
                if let Some(error) = callbacks.on_error {
                    error(userdata as *mut c_void, message.as_ptr());
                }
            });
        }
    }

    fn setup_encoding(&self, handle: &PipelineHandle, path: &Path, width: u32, height: u32) {
        self.with_pipeline(handle, "setup_encoding", |entry| {
            let p = &mut entry.pipeline;
            p.direction = Some(Direction::Encoding);
            p.encoding = Some((path.to_path_buf(), width, height));
            p.loaded = true;
            p.playing = false;
            p.play_requested = false;
            p.consumed = 0;
            p.last_consumed = None;
            p.eos_sent = false;
        });
    }

    fn play(&self, handle: &PipelineHandle) {
        self.with_pipeline(handle, "play", |entry| {
            let p = &mut entry.pipeline;
            p.play_requested = p.loaded;
            if p.direction == Some(Direction::Encoding) {
                p.playing = p.loaded;
            }
        });
    }

    fn pause(&self, handle: &PipelineHandle) {
        self.with_pipeline(handle, "pause", |entry| {
            entry.pipeline.playing = false;
            entry.pipeline.play_requested = false;
        });
    }

    fn stop(&self, handle: &PipelineHandle) {
        self.with_pipeline(handle, "stop", |entry| {
            let p = &mut entry.pipeline;
            p.playing = false;
            p.play_requested = false;
            p.position = 0.0;
            p.eos_sent = false;
        });
    }

    fn close(&self, handle: &PipelineHandle) {
        self.with_pipeline(handle, "close", |entry| {
            let p = &mut entry.pipeline;
            p.loaded = false;
            p.playing = false;
            p.play_requested = false;
            p.pending_frame = None;
            p.grabbed = None;
        });
    }

    fn is_loaded(&self, handle: &PipelineHandle) -> bool {
        self.with_pipeline(handle, "is_loaded", |entry| entry.pipeline.loaded)
            .unwrap_or(false)
    }

    fn is_playing(&self, handle: &PipelineHandle) -> bool {
        self.with_pipeline(handle, "is_playing", |entry| entry.pipeline.playing)
            .unwrap_or(false)
    }

    fn grab_frame(&self, handle: &PipelineHandle) -> Option<(u32, u32)> {
        let auto = self.auto_frames;
        let mut finished = None;
        let mut qos = None;

        let grabbed = self
            .with_pipeline(handle, "grab_frame", |entry| {
                let p = &mut entry.pipeline;
                if p.play_requested && p.loaded {
                    p.playing = true;
                }

                if p.pending_frame.is_none()
                    && p.playing
                    && !p.eos_sent
                    && let Some(auto) = auto
                {
                    if p.position >= p.duration {
                        p.eos_sent = true;
                        finished = Some((entry.callbacks, p.userdata));
                        return None;
                    }
                    p.position += auto.step;
                    let shade = (p.frames_grabbed % 256) as u8;
                    p.pending_frame = Some(SimFrame {
                        width: auto.width,
                        height: auto.height,
                        color: [shade, 0x40, 0x80, 0xff],
                    });
                }

                let frame = p.pending_frame.take()?;
                let crop = p.decoding.as_ref().map(|d| d.crop).unwrap_or_default();
                let (width, height) = crop.apply(frame.width, frame.height);
                p.grabbed = Some(SimFrame {
                    width,
                    height,
                    color: frame.color,
                });
                p.frames_grabbed += 1;

                if let Some(auto) = auto
                    && p.frames_grabbed % auto.qos_every == 0
                {
                    qos = Some((
                        entry.callbacks,
                        p.userdata,
                        QosData {
                            jitter: 250_000,
                            running_time: (p.position * 1e9) as u64,
                            stream_time: (p.position * 1e9) as u64,
                            timestamp: (p.position * 1e9) as u64,
                            proportion: 1.0,
                            processed: p.frames_grabbed,
                            dropped: p.frames_grabbed / 50,
                        },
                    ));
                }
                Some((width, height))
            })
            .flatten();

        if let Some((callbacks, userdata)) = finished {
            trace!("sim: pipeline reached end of stream");
            self.spawn_worker(move || {
                if let Some(eos) = callbacks.on_eos {
                    eos(userdata as *mut c_void);
                }
            });
        }
        if let Some((callbacks, userdata, report)) = qos {
            self.spawn_worker(move || fire_qos(callbacks, userdata, report));
        }
        grabbed
    }

    unsafe fn blit_image(&self, handle: &PipelineHandle, surface: NonNull<c_void>) {
        let surface = unsafe { surface.cast::<CpuSurface>().as_ref() };
        let frame = self
            .with_pipeline(handle, "blit_image", |entry| {
                let frame = entry.pipeline.grabbed?;
                if entry.pipeline.blits.len() >= BLIT_HISTORY {
                    entry.pipeline.blits.remove(0);
                }
                entry.pipeline.blits.push(BlitRecord {
                    frame: (frame.width, frame.height),
                    surface: (surface.width, surface.height),
                });
                Some(frame)
            })
            .flatten();

        let Some(frame) = frame else { return };
        if surface.data.is_null() {
            return;
        }

        let rows = frame.height.min(surface.height) as usize;
        let cols = frame.width.min(surface.width) as usize;
        for y in 0..rows {
            let row = unsafe {
                std::slice::from_raw_parts_mut(
                    surface.data.add(y * surface.stride as usize),
                    cols * 4,
                )
            };
            for pixel in row.chunks_exact_mut(4) {
                pixel.copy_from_slice(&frame.color);
            }
        }
    }

    fn consume_image(&self, handle: &PipelineHandle, data: &[u8]) {
        self.with_pipeline(handle, "consume_image", |entry| {
            entry.pipeline.consumed += 1;
            entry.pipeline.last_consumed = Some(Bytes::copy_from_slice(data));
        });
    }

    fn stop_encoding(&self, handle: &PipelineHandle) {
        let target = self
            .with_pipeline(handle, "stop_encoding", |entry| {
                let p = &mut entry.pipeline;
                // A stopped or closed encoder never posts end of stream.
                if p.eos_sent || !(p.loaded && p.playing) {
                    return None;
                }
                p.eos_sent = true;
                Some((entry.callbacks, p.userdata))
            })
            .flatten();

        if let Some((callbacks, userdata)) = target {
            let delay = self.eos_delay;
            self.spawn_worker(move || {
                thread::sleep(delay);
                if let Some(eos) = callbacks.on_eos {
                    eos(userdata as *mut c_void);
                }
            });
        }
    }

    fn duration(&self, handle: &PipelineHandle) -> f64 {
        self.with_pipeline(handle, "duration", |entry| entry.pipeline.duration)
            .unwrap_or(0.0)
    }

    fn position(&self, handle: &PipelineHandle) -> f64 {
        self.with_pipeline(handle, "position", |entry| entry.pipeline.position)
            .unwrap_or(0.0)
    }

    fn set_position(&self, handle: &PipelineHandle, position: f64) {
        self.with_pipeline(handle, "set_position", |entry| {
            entry.pipeline.position = position;
            entry.pipeline.eos_sent = false;
        });
    }

    fn set_basetime(&self, handle: &PipelineHandle, basetime: u64) {
        self.with_pipeline(handle, "set_basetime", |entry| {
            entry.pipeline.basetime = basetime;
        });
    }

    fn set_volume(&self, handle: &PipelineHandle, volume: f64) {
        self.with_pipeline(handle, "set_volume", |entry| {
            entry.pipeline.volume = volume;
        });
    }

    fn set_adaptive_bitrate_limit(&self, handle: &PipelineHandle, limit: f32) {
        self.with_pipeline(handle, "set_adaptive_bitrate_limit", |entry| {
            entry.pipeline.adaptive_bitrate_limit = limit;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CroppingParams;
    use crate::display::{ImageBuffer, PixelBuffer};

    fn create(engine: &SimulatedEngine) -> PipelineHandle {
        engine
            .create("sim-test", NativeCallbacks::default(), 1)
            .unwrap()
    }

    #[test]
    fn test_grab_is_idempotent_per_frame() {
        let engine = SimulatedEngine::new();
        let handle = create(&engine);
        engine.setup_decoding(&handle, &DecodingConfig::new("file:///x", 0, 0));
        engine.play(&handle);

        assert_eq!(engine.grab_frame(&handle), None);
        assert!(engine.is_playing(&handle));

        engine.push_frame(handle.id(), 8, 4, [1, 2, 3, 4]);
        assert_eq!(engine.grab_frame(&handle), Some((8, 4)));
        assert_eq!(engine.grab_frame(&handle), None);
        engine.destroy(handle);
    }

    #[test]
    fn test_grab_applies_crop() {
        let engine = SimulatedEngine::new();
        let handle = create(&engine);
        let mut config = DecodingConfig::new("file:///x", 0, 0);
        config.crop = CroppingParams { left: 0.25, top: 0.0, right: 0.25, bottom: 0.5 };
        engine.setup_decoding(&handle, &config);
        engine.play(&handle);

        engine.push_frame(handle.id(), 400, 200, [0; 4]);
        assert_eq!(engine.grab_frame(&handle), Some((200, 100)));
        engine.destroy(handle);
    }

    #[test]
    fn test_blit_fills_surface() {
        let engine = SimulatedEngine::new();
        let handle = create(&engine);
        engine.setup_decoding(&handle, &DecodingConfig::new("file:///x", 0, 0));
        engine.play(&handle);
        engine.push_frame(handle.id(), 2, 2, [9, 8, 7, 6]);
        engine.grab_frame(&handle);

        let mut image = PixelBuffer::new(2, 2);
        let surface = image.surface().unwrap();
        unsafe { engine.blit_image(&handle, surface) };

        assert!(image.pixels().chunks_exact(4).all(|p| p == [9, 8, 7, 6]));
        let blits = engine.snapshot(handle.id()).unwrap().blits;
        assert_eq!(blits, vec![BlitRecord { frame: (2, 2), surface: (2, 2) }]);
        engine.destroy(handle);
    }

    #[test]
    fn test_auto_frames_reach_end_of_stream() {
        let engine = SimulatedEngine::new()
            .with_auto_frames(16, 9, 0.5)
            .with_duration(1.0);
        let handle = create(&engine);
        engine.setup_decoding(&handle, &DecodingConfig::new("file:///x", 0, 0));
        engine.play(&handle);

        assert_eq!(engine.grab_frame(&handle), Some((16, 9)));
        assert_eq!(engine.grab_frame(&handle), Some((16, 9)));
        assert_eq!(engine.grab_frame(&handle), None);
        assert!(engine.snapshot(handle.id()).unwrap().eos_sent);

        engine.set_position(&handle, 0.0);
        assert_eq!(engine.grab_frame(&handle), Some((16, 9)));
        engine.settle();
        engine.destroy(handle);
    }

    #[test]
    fn test_calls_counted_after_destroy() {
        let engine = SimulatedEngine::new();
        let handle = create(&engine);
        let id = handle.id();
        engine.play(&handle);
        engine.destroy(handle);

        assert_eq!(engine.call_count(id, "play"), 1);
        assert_eq!(engine.call_count(id, "destroy"), 1);
        assert!(engine.snapshot(id).is_none());
        assert_eq!(engine.pipeline_count(), 0);
    }

    #[test]
    fn test_blit_history_is_bounded() {
        let engine = SimulatedEngine::new();
        let handle = create(&engine);
        engine.setup_decoding(&handle, &DecodingConfig::new("file:///x", 0, 0));
        engine.play(&handle);

        let mut image = PixelBuffer::new(1, 1);
        let surface = image.surface().unwrap();
        for _ in 0..BLIT_HISTORY + 10 {
            engine.push_frame(handle.id(), 1, 1, [0; 4]);
            engine.grab_frame(&handle);
            unsafe { engine.blit_image(&handle, surface) };
        }

        assert_eq!(engine.snapshot(handle.id()).unwrap().blits.len(), BLIT_HISTORY);
        assert_eq!(engine.call_count(handle.id(), "blit_image"), BLIT_HISTORY + 10);
        engine.destroy(handle);
    }

    #[test]
    fn test_finished_workers_are_pruned() {
        let engine = SimulatedEngine::new()
            .with_auto_frames(4, 4, 0.1)
            .with_duration(1000.0);
        let handle = create(&engine);
        engine.setup_decoding(&handle, &DecodingConfig::new("file:///x", 0, 0));
        engine.play(&handle);

        // One QoS report per 30 grabs, each on its own thread.
        for _ in 0..30 * 20 {
            engine.grab_frame(&handle);
            thread::sleep(Duration::from_micros(200));
        }
        assert!(engine.pending_workers() < 20);
        engine.settle();
        assert_eq!(engine.pending_workers(), 0);
        engine.destroy(handle);
    }

    #[test]
    fn test_end_of_stream_only_from_running_encoder() {
        let engine = SimulatedEngine::new();
        let handle = create(&engine);
        let id = handle.id();
        engine.setup_encoding(&handle, Path::new("out.mp4"), 2, 2);

        engine.stop_encoding(&handle);
        assert!(!engine.snapshot(id).unwrap().eos_sent);

        engine.play(&handle);
        engine.stop(&handle);
        engine.stop_encoding(&handle);
        assert!(!engine.snapshot(id).unwrap().eos_sent);

        engine.play(&handle);
        engine.stop_encoding(&handle);
        assert!(engine.snapshot(id).unwrap().eos_sent);

        engine.close(&handle);
        engine.setup_encoding(&handle, Path::new("out.mp4"), 2, 2);
        engine.stop_encoding(&handle);
        assert!(!engine.snapshot(id).unwrap().eos_sent);

        engine.settle();
        engine.destroy(handle);
    }

    #[test]
    fn test_fail_next_create() {
        let engine = SimulatedEngine::new();
        engine.fail_next_create();
        assert!(engine.create("x", NativeCallbacks::default(), 1).is_none());
        assert!(engine.create("x", NativeCallbacks::default(), 1).is_some());
    }
}
