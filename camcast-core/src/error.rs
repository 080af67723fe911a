//! Domain-specific error types for camcast.
//!
//! All fallible operations return `Result<T, CastError>`.
//! Per-message faults (timeouts, corrupt frames) are ordinary values that the
//! stream supervisor inspects and contains; only stream-level failures travel
//! further up.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for camcast.
#[derive(Debug, Error)]
pub enum CastError {
    // ── Stream lifecycle ─────────────────────────────────────────
    /// No initial message arrived within the connect deadline.
    #[error("no frame received within {0:?}; stream never connected")]
    ConnectTimeout(Duration),

    /// A receive attempt produced no data within its window.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Cooperative shutdown was requested.
    #[error("cancelled")]
    Cancelled,

    /// A state machine was asked to perform a transition it does not allow.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/UDP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The channel's background task ended or every sender was dropped.
    #[error("channel closed")]
    ChannelClosed,

    /// An endpoint string could not be parsed.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    // ── Codec Errors ─────────────────────────────────────────────
    /// A received payload could not be turned into a frame.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Encoding a frame for the wire failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl CastError {
    /// Whether this error only means "nothing arrived this time".
    pub fn is_timeout(&self) -> bool {
        matches!(self, CastError::Timeout(_))
    }
}

// ── DecodeError ──────────────────────────────────────────────────

/// Why a single payload was rejected by a [`FrameDecoder`](crate::codec::FrameDecoder).
///
/// A decode error only ever drops the message that caused it.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload contained no bytes.
    #[error("empty payload")]
    EmptyPayload,

    /// The text framing was not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The image bytes could not be decoded.
    #[error("invalid image: {0}")]
    Image(#[from] image::ImageError),

    /// Pixel buffer and declared dimensions disagree.
    #[error("invalid dimensions {width}x{height}x{channels} for {len} bytes")]
    Dimensions {
        width: u32,
        height: u32,
        channels: usize,
        len: usize,
    },

    /// The blocking decode worker was lost (panicked or cancelled).
    #[error("decode worker aborted")]
    Aborted,
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for CastError {
    fn from(s: String) -> Self {
        CastError::Other(s)
    }
}

impl From<&str> for CastError {
    fn from(s: &str) -> Self {
        CastError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CastError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        CastError::ChannelClosed
    }
}
