//! Producer side: grabs frames from a source, encodes them and publishes
//! them on a [`PubSocket`].
//!
//! 1. [`FrameSource::grab`] returns the next raw frame.
//! 2. [`JpegCodec`] turns it into a base64 JPEG payload.
//! 3. [`PubSocket::send`] fans it out to whoever is subscribed.
//! 4. The loop sleeps for the rest of the frame interval.
//!
//! A failed grab or encode skips that frame. The loop ends on cancellation,
//! or when the source runs dry or panics.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{DEFAULT_JPEG_QUALITY, JpegCodec};
use crate::error::CastError;
use crate::frame::DecodedFrame;
use crate::stream::{RateEstimator, StreamId, format_rate};
use crate::transport::PubSocket;

// ── FrameSource ──────────────────────────────────────────────────

/// Anything that yields raw frames: a camera, a file, a test pattern.
pub trait FrameSource: Send {
    /// Produce the next frame. `Ok(None)` means the source is exhausted.
    fn grab(&mut self) -> Result<Option<DecodedFrame>, CastError>;
}

// ── PublisherConfig ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Target frames per second (at least 1).
    pub target_fps: u32,
    pub jpeg_quality: u8,
    /// Log a read failure only every this many failures.
    pub log_every: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            log_every: 50,
        }
    }
}

impl PublisherConfig {
    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }
}

/// Counters returned when a publisher stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub read_failures: u64,
    pub encode_failures: u64,
}

// ── StreamPublisher ──────────────────────────────────────────────

/// One source published on one socket.
pub struct StreamPublisher {
    id: StreamId,
    socket: PubSocket,
    source: Box<dyn FrameSource>,
    codec: JpegCodec,
    config: PublisherConfig,
    rate: RateEstimator,
}

impl StreamPublisher {
    pub fn new(socket: PubSocket, source: Box<dyn FrameSource>, config: PublisherConfig) -> Self {
        let id = StreamId::from_port(socket.local_addr().port());
        Self {
            id,
            socket,
            source,
            codec: JpegCodec::with_quality(config.jpeg_quality),
            config,
            rate: RateEstimator::new(),
        }
    }

    /// Bind a socket on `addr` and wrap it.
    pub async fn bind(
        addr: SocketAddr,
        source: Box<dyn FrameSource>,
        config: PublisherConfig,
    ) -> Result<Self, CastError> {
        let socket = PubSocket::bind(addr, 4).await?;
        Ok(Self::new(socket, source, config))
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    pub fn subscriber_count(&self) -> usize {
        self.socket.subscriber_count()
    }

    /// Publish until `cancel` fires or the source runs dry, then close the
    /// socket.
    ///
    /// Grabbing and encoding run on the blocking pool, so a slow camera or
    /// encoder never stalls the runtime thread.
    pub async fn run(self, cancel: CancellationToken) -> PublisherStats {
        let Self {
            id,
            socket,
            mut source,
            codec,
            config,
            mut rate,
        } = self;
        let interval = config.frame_interval();
        let log_every = config.log_every.max(1);
        let mut stats = PublisherStats::default();

        info!(stream = %id, addr = %socket.local_addr(), fps = config.target_fps, "publishing");

        loop {
            let loop_start = Instant::now();

            let handle = tokio::task::spawn_blocking(move || {
                let captured = capture(source.as_mut(), &codec);
                (source, captured)
            });
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                step = handle => step,
            };
            let captured = match step {
                Ok((returned, captured)) => {
                    source = returned;
                    captured
                }
                Err(e) => {
                    warn!(stream = %id, "capture task failed: {e}");
                    break;
                }
            };

            match captured {
                Capture::Payload(payload) => {
                    stats.bytes_sent += payload.len() as u64;
                    stats.frames_sent += 1;
                    let reached = socket.send(payload);

                    let previous = rate.current(id);
                    let current = rate.sample(id, stats.bytes_sent);
                    if previous != Some(current) {
                        debug!(stream = %id, subscribers = reached, rate = %format_rate(current), "send rate");
                    }
                }
                Capture::Exhausted => {
                    info!(stream = %id, "source exhausted");
                    break;
                }
                Capture::ReadFailed(e) => {
                    stats.read_failures += 1;
                    if stats.read_failures % log_every == 0 {
                        warn!(stream = %id, failures = stats.read_failures, "failed to read frame: {e}");
                    }
                }
                Capture::EncodeFailed(e) => {
                    stats.encode_failures += 1;
                    warn!(stream = %id, "dropping frame: {e}");
                }
            }

            let remaining = interval.saturating_sub(loop_start.elapsed());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        socket.close().await;
        info!(
            stream = %id,
            frames_sent = stats.frames_sent,
            read_failures = stats.read_failures,
            "publisher stopped after {} frames",
            stats.frames_sent
        );
        stats
    }
}

/// Result of one grab + encode step.
enum Capture {
    Payload(Bytes),
    Exhausted,
    ReadFailed(CastError),
    EncodeFailed(CastError),
}

fn capture(source: &mut dyn FrameSource, codec: &JpegCodec) -> Capture {
    match source.grab() {
        Ok(Some(frame)) => match codec.encode(&frame) {
            Ok(payload) => Capture::Payload(payload),
            Err(e) => Capture::EncodeFailed(e),
        },
        Ok(None) => Capture::Exhausted,
        Err(e) => Capture::ReadFailed(e),
    }
}

// ── Tests ────────────────────────────────────────────────────────
