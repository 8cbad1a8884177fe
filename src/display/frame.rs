//! Per-tick frame acquisition: grab, resize, blit

use std::fmt;

use log::trace;

use super::image::ImageBuffer;
use crate::pipeline::NativePipeline;

/// Size of the most recently grabbed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for FrameDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Outcome of one [`FrameAcquisition::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePoll {
    /// No frame newer than the last one
    Idle,
    /// A new frame was copied into the image
    Frame {
        descriptor: FrameDescriptor,
        /// First frame since the last (re)start
        first: bool,
        /// The image had to be reallocated first
        resized: bool,
    },
}

#[derive(Debug)]
pub struct FrameAcquisition {
    last: Option<FrameDescriptor>,
    awaiting_first: bool,
    frames: u64,
}

impl FrameAcquisition {
    pub fn new() -> Self {
        Self {
            last: None,
            awaiting_first: true,
            frames: 0,
        }
    }

    /// The next frame counts as the first one again.
    pub fn rearm(&mut self) {
        self.awaiting_first = true;
    }

    pub fn last(&self) -> Option<FrameDescriptor> {
        self.last
    }

    /// Frames copied since creation.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Grab the newest frame from `pipeline` into `image`, resizing the image
    /// first when the frame size differs.
    ///
    /// A grab that reports a zero width or height is consumed but not
    /// blitted: it returns [`FramePoll::Idle`], leaves the image untouched and
    /// does not count as the first frame.
    pub fn poll<I: ImageBuffer + ?Sized>(
        &mut self,
        pipeline: &NativePipeline,
        image: &mut I,
    ) -> FramePoll {
        let Some((width, height)) = pipeline.grab_frame() else {
            return FramePoll::Idle;
        };
        if width == 0 || height == 0 {
            trace!("[{}] Ignoring empty {}x{} frame", pipeline.name(), width, height);
            return FramePoll::Idle;
        }

        let descriptor = FrameDescriptor { width, height };
        let resized = image.size() != (width, height);
        if resized {
            image.resize(width, height);
        }

        // Safety: the surface borrows from `image`, which stays exclusively
        // borrowed and unchanged until the blit returns.
        unsafe { pipeline.blit_into(image.surface()) };

        self.last = Some(descriptor);
        self.frames += 1;
        FramePoll::Frame {
            descriptor,
            first: std::mem::replace(&mut self.awaiting_first, false),
            resized,
        }
    }
}

impl Default for FrameAcquisition {
    fn default() -> Self {
        Self::new()
    }
}
