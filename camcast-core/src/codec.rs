//! Frame codec: base64-wrapped JPEG payloads.
//!
//! Producers publish each frame as the base64 text of a JPEG image. The
//! text framing keeps payloads printable; the JPEG quality is the only knob.
//!
//! Receivers only see the [`FrameDecoder`] trait, so the supervisor can be
//! driven by any decoder (tests use trivial ones).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};

use crate::error::{CastError, DecodeError};
use crate::frame::{DecodedFrame, PixelFormat};

/// Default JPEG quality used by producers.
pub const DEFAULT_JPEG_QUALITY: u8 = 20;

// ── FrameDecoder ─────────────────────────────────────────────────

/// Converts one raw payload into a validated frame.
///
/// Implementations must be cheap to share: the supervisor runs `decode` on
/// the blocking pool with an `Arc<dyn FrameDecoder>`.
pub trait FrameDecoder: Send + Sync {
    /// Decode a single payload.
    fn decode(&self, payload: &[u8]) -> Result<DecodedFrame, DecodeError>;
}

// ── JpegCodec ────────────────────────────────────────────────────

/// Base64 + JPEG codec.
#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    quality: u8,
}

impl JpegCodec {
    /// Create a codec with the default quality.
    pub fn new() -> Self {
        Self::with_quality(DEFAULT_JPEG_QUALITY)
    }

    /// Create a codec with an explicit JPEG quality (clamped to 1..=100).
    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// Configured JPEG quality.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode a frame into its wire payload.
    pub fn encode(&self, frame: &DecodedFrame) -> Result<Bytes, CastError> {
        let color = match frame.format() {
            PixelFormat::Rgb8 => ExtendedColorType::Rgb8,
            PixelFormat::Gray8 => ExtendedColorType::L8,
        };

        let mut jpeg = Vec::with_capacity(frame.byte_len() / 8);
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode(frame.data(), frame.width(), frame.height(), color)
            .map_err(|e| CastError::Encoding(format!("jpeg encode failed: {e}")))?;

        Ok(Bytes::from(STANDARD.encode(&jpeg)))
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for JpegCodec {
    /// Decoding always yields a 3-channel RGB frame, whatever the source
    /// layout was.
    fn decode(&self, payload: &[u8]) -> Result<DecodedFrame, DecodeError> {
        let text = payload.trim_ascii();
        if text.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }

        let jpeg = STANDARD.decode(text)?;
        let rgb = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)?.into_rgb8();
        let (width, height) = rgb.dimensions();

        DecodedFrame::new(width, height, PixelFormat::Rgb8, rgb.into_raw())
    }
}

// ── Tests ────────────────────────────────────────────────────────
