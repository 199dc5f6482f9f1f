//! Video frame views handed from the core thread to presentation

use std::sync::Arc;

/// Bytes per RGBA8 pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Borrowed view of one completed video frame.
///
/// Pixels are RGBA8. The view is only valid while the callback that
/// received it runs; the producer may reuse the memory afterwards. The
/// geometry is checked on construction, so every row is in bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameRef<'a> {
    pixels: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
}

impl<'a> FrameRef<'a> {
    /// Create a frame view, or `None` if the buffer is too small for the
    /// given geometry.
    pub fn new(pixels: &'a [u8], width: u32, height: u32, stride: usize) -> Option<Self> {
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        if stride < row_bytes {
            return None;
        }
        let needed = match height {
            0 => 0,
            h => stride * (h as usize - 1) + row_bytes,
        };
        if pixels.len() < needed {
            return None;
        }
        Some(Self {
            pixels,
            width,
            height,
            stride,
        })
    }

    /// Tightly packed frame (stride equals row width)
    pub fn packed(pixels: &'a [u8], width: u32, height: u32) -> Option<Self> {
        Self::new(pixels, width, height, width as usize * BYTES_PER_PIXEL)
    }

    /// Pixel rows, `stride` bytes apart
    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Distance between rows in bytes
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes of visible pixels in one row
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Visible pixels of row `y`
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride;
        &self.pixels[start..start + self.row_bytes()]
    }

    /// Copy the visible pixels into a packed buffer, reusing its allocation.
    pub fn copy_packed_into(&self, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(self.row_bytes() * self.height as usize);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
    }
}

/// Handler invoked on the core thread for every delivered frame.
///
/// It gates the core's progress, so it must not block.
pub type FrameCallback = Arc<dyn Fn(&FrameRef<'_>) + Send + Sync>;
