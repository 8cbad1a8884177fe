use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use log::warn;
use serde::{Deserialize, Serialize};

/// Fractions of the decoded picture to discard on each side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CroppingParams {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl CroppingParams {
    /// Cropping only makes sense if something is left on both axes.
    pub fn is_effective(&self) -> bool {
        self.left + self.right < 1.0 && self.top + self.bottom < 1.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Clamped copy, or all zeros if the crop would remove the whole picture.
    pub fn normalized(&self) -> Self {
        let clamped = Self {
            left: self.left.clamp(0.0, 1.0),
            top: self.top.clamp(0.0, 1.0),
            right: self.right.clamp(0.0, 1.0),
            bottom: self.bottom.clamp(0.0, 1.0),
        };
        if clamped.is_effective() {
            clamped
        } else {
            warn!("Ignoring cropping {:?}: nothing would be left to display", self);
            Self::default()
        }
    }

    /// Size of a `width` x `height` picture after cropping.
    pub fn apply(&self, width: u32, height: u32) -> (u32, u32) {
        let w = width as f32 * (1.0 - self.left - self.right);
        let h = height as f32 * (1.0 - self.top - self.bottom);
        (w as u32, h as u32)
    }
}

/// Which network clock the engine slaves the pipeline to.
///
/// `DvbWallClock` selects the DVB-CSS wall-clock protocol instead of the
/// engine's own network clock client; the exact on-wire semantics belong to
/// the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    #[default]
    NetClient,
    DvbWallClock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynchronizationParams {
    /// If false, the rest of the fields are unused.
    pub enabled: bool,
    pub master_clock_address: String,
    pub master_clock_port: u16,
    pub clock_mode: ClockMode,
    /// Nanoseconds. Lets several players join an already running pipeline;
    /// zero plays from the beginning.
    pub base_time: u64,
}

impl Default for SynchronizationParams {
    fn default() -> Self {
        Self {
            enabled: false,
            master_clock_address: String::new(),
            master_clock_port: 0,
            clock_mode: ClockMode::NetClient,
            base_time: 0,
        }
    }
}

impl SynchronizationParams {
    pub fn network_clock(&self) -> Option<NetworkClock> {
        if !self.enabled || self.master_clock_address.is_empty() {
            return None;
        }
        Some(NetworkClock {
            address: self.master_clock_address.clone(),
            port: self.master_clock_port,
            mode: self.clock_mode,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugParams {
    /// Forward engine diagnostics into the `log` facade.
    pub enabled: bool,
    /// Category/level list in the engine's own syntax. Empty disables it.
    pub engine_debug: String,
}

impl Default for DebugParams {
    fn default() -> Self {
        Self {
            enabled: false,
            engine_debug: "2".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackParams {
    /// Pipeline name reported to the engine; defaults to "session".
    pub name: Option<String>,
    pub uri: String,
    /// Zero-based; negative disables the video stream.
    pub video_index: i32,
    /// Zero-based; negative disables the audio stream.
    pub audio_index: i32,
    /// Seek back to the start when the stream finishes.
    pub looping: bool,
    /// 0 (mute) to 1 (max).
    pub volume: f64,
    /// 0 (lowest quality) to 1 (highest) for adaptive streams.
    pub adaptive_bitrate_limit: f32,
    pub initial_width: u32,
    pub initial_height: u32,
}

impl Default for PlaybackParams {
    fn default() -> Self {
        Self {
            name: None,
            uri: String::new(),
            video_index: 0,
            audio_index: 0,
            looping: false,
            volume: 1.0,
            adaptive_bitrate_limit: 1.0,
            initial_width: 64,
            initial_height: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeardownParams {
    /// Retry interval of the end-of-stream wait when destroying an encoder.
    pub eos_poll_interval_ms: u64,
    /// Give up waiting after this long. `None` waits indefinitely.
    pub eos_timeout_ms: Option<u64>,
}

impl Default for TeardownParams {
    fn default() -> Self {
        Self {
            eos_poll_interval_ms: 10,
            eos_timeout_ms: None,
        }
    }
}

impl TeardownParams {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.eos_poll_interval_ms.max(1))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.eos_timeout_ms.map(Duration::from_millis)
    }
}

/// Everything a session needs besides the engine itself.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub playback: PlaybackParams,
    pub cropping: CroppingParams,
    pub synchronization: SynchronizationParams,
    pub debug: DebugParams,
    pub teardown: TeardownParams,
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decoding setup for `uri` using this config's clock and crop settings.
    pub fn decoding(&self, uri: &str, video_index: i32, audio_index: i32) -> DecodingConfig {
        DecodingConfig {
            uri: uri.to_string(),
            video_index,
            audio_index,
            network_clock: self.synchronization.network_clock(),
            base_time: self.synchronization.base_time,
            crop: self.cropping.normalized(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkClock {
    pub address: String,
    pub port: u16,
    pub mode: ClockMode,
}

/// Superset of every decoding setup variant the engine accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodingConfig {
    pub uri: String,
    pub video_index: i32,
    pub audio_index: i32,
    pub network_clock: Option<NetworkClock>,
    /// Nanoseconds.
    pub base_time: u64,
    pub crop: CroppingParams,
}

impl DecodingConfig {
    pub fn new(uri: impl Into<String>, video_index: i32, audio_index: i32) -> Self {
        Self {
            uri: uri.into(),
            video_index,
            audio_index,
            network_clock: None,
            base_time: 0,
            crop: CroppingParams::default(),
        }
    }

    pub fn has_video(&self) -> bool {
        self.video_index >= 0
    }

    pub fn has_audio(&self) -> bool {
        self.audio_index >= 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingConfig {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl EncodingConfig {
    /// Bytes in one RGBA frame at this size.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}
