//! Host-side destination images for frame blits
//!
//! # Design
//!
//! The engine copies pixels straight into a destination it is handed as an
//! opaque pointer. For a real renderer that pointer is a native texture;
//! [`PixelBuffer`] is the CPU-memory equivalent, described to the engine by
//! a `#[repr(C)]` [`CpuSurface`] header.
//!
//! # Safety
//!
//! The pointer returned by [`ImageBuffer::surface`] borrows from the image.
//! It is valid until the image is next resized, mutated or dropped, and
//! must only be used while the image is exclusively borrowed by the caller.

use std::ffi::c_void;
use std::ptr::{self, NonNull};

use log::debug;

/// A blit destination the host owns.
pub trait ImageBuffer {
    /// Current size in pixels.
    fn size(&self) -> (u32, u32);

    /// Reallocate to `width` x `height`. Previous contents are not kept.
    fn resize(&mut self, width: u32, height: u32);

    /// Opaque destination for the engine, or `None` if there is nothing to
    /// write into (a zero-sized image, for example).
    fn surface(&mut self) -> Option<NonNull<c_void>>;
}

/// RGBA destination in CPU memory, as the engine sees it.
#[repr(C)]
#[derive(Debug)]
pub struct CpuSurface {
    pub data: *mut u8,
    pub width: u32,
    pub height: u32,
    /// Bytes per row.
    pub stride: u32,
}

impl CpuSurface {
    fn empty() -> Self {
        Self {
            data: ptr::null_mut(),
            width: 0,
            height: 0,
            stride: 0,
        }
    }
}

/// Tightly packed RGBA image.
pub struct PixelBuffer {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    /// Header handed to the engine; refreshed on every `surface()` call.
    header: CpuSurface,
}

// Safety: `header.data` only ever points into `pixels`, which the buffer owns.
unsafe impl Send for PixelBuffer {}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: vec![0; Self::byte_len(width, height)],
            width,
            height,
            header: CpuSurface::empty(),
        }
    }

    fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA value at (`x`, `y`), top row first.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let mut rgba = [0; 4];
        rgba.copy_from_slice(&self.pixels[offset..offset + 4]);
        Some(rgba)
    }
}

impl ImageBuffer for PixelBuffer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        debug!(
            "Resizing image {}x{} -> {}x{}",
            self.width, self.height, width, height
        );
        self.pixels = vec![0; Self::byte_len(width, height)];
        self.width = width;
        self.height = height;
        self.header = CpuSurface::empty();
    }

    fn surface(&mut self) -> Option<NonNull<c_void>> {
        if self.pixels.is_empty() {
            return None;
        }
        self.header = CpuSurface {
            data: self.pixels.as_mut_ptr(),
            width: self.width,
            height: self.height,
            stride: self.width * 4,
        };
        Some(NonNull::from(&mut self.header).cast())
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
