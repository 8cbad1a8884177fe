//! Frame acquisition into host-owned images

pub mod frame;
pub mod image;

pub use frame::{FrameAcquisition, FrameDescriptor, FramePoll};
pub use image::{CpuSurface, ImageBuffer, PixelBuffer};
