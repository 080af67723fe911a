//! Shared frame types for the capture → wire → display pipeline.
//!
//! A [`DecodedFrame`] is immutable once built: its pixel storage is a
//! reference-counted [`Bytes`] buffer, so handing a "copy" to a reader is a
//! pointer bump and a writer can only ever replace a frame wholesale.

use std::time::Instant;

use bytes::Bytes;

use crate::error::DecodeError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
    /// 1 byte per pixel: luminance.
    Gray8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Rgb8 => write!(f, "rgb8"),
            PixelFormat::Gray8 => write!(f, "gray8"),
        }
    }
}

// ── DecodedFrame ─────────────────────────────────────────────────

/// A validated, tightly packed 2-D pixel buffer.
///
/// The `data` buffer holds `height` rows of `width * bytes_per_pixel` bytes
/// each, with no row padding. Equality compares geometry and pixels only,
/// not timestamps.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Bytes,
    timestamp: Instant,
}

impl DecodedFrame {
    /// Build a frame, checking that the buffer matches the dimensions.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: impl Into<Bytes>,
    ) -> Result<Self, DecodeError> {
        let data = data.into();
        let channels = format.bytes_per_pixel();
        let expected = width as usize * height as usize * channels;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(DecodeError::Dimensions {
                width,
                height,
                channels,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
            timestamp: Instant::now(),
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel layout.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Channel depth (bytes per pixel).
    pub fn channels(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    /// Raw pixel bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// When the frame was produced (decoded or captured).
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Total byte size of the pixel buffer.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Returns a row slice.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * self.channels();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Returns the pixel bytes at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.channels();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        &self.data[offset..offset + bpp]
    }
}

impl PartialEq for DecodedFrame {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.format == other.format
            && self.data == other.data
    }
}

impl Eq for DecodedFrame {}
