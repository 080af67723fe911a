//! TCP publisher: fans one payload stream out to every attached subscriber.
//!
//! Each accepted subscriber gets its own writer task reading from a
//! `tokio::sync::broadcast` channel, so a slow viewer never holds up the
//! producer or the other viewers. A writer that falls behind skips the
//! payloads it missed. Payloads published while nobody is attached are
//! simply dropped.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::codec::{FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use super::MAX_FRAME_LENGTH;
use crate::error::CastError;

// ── PubSocket ────────────────────────────────────────────────────

/// Bound publisher socket.
pub struct PubSocket {
    local_addr: SocketAddr,
    tx: broadcast::Sender<Bytes>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl PubSocket {
    /// Bind a listener on `addr`.
    ///
    /// `capacity` is how many payloads a subscriber may fall behind before
    /// it starts skipping.
    pub async fn bind(addr: impl ToSocketAddrs, capacity: usize) -> Result<Self, CastError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (tx, _) = broadcast::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();

        tasks.spawn(accept_loop(
            listener,
            tx.clone(),
            cancel.clone(),
            tasks.clone(),
        ));
        info!(%local_addr, "publisher bound");

        Ok(Self {
            local_addr,
            tx,
            cancel,
            tasks,
        })
    }

    /// The address the listener actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish a payload. Returns how many subscribers it was queued for.
    pub fn send(&self, payload: Bytes) -> usize {
        self.tx.send(payload).unwrap_or(0)
    }

    /// Stop accepting, detach every subscriber and wait for the writers.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        debug!(local_addr = %self.local_addr, "publisher closed");
    }
}

impl Drop for PubSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Tasks ────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    tx: broadcast::Sender<Bytes>,
    cancel: CancellationToken,
    tasks: TaskTracker,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => return,
            result = listener.accept() => result,
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "subscriber attached");
                let _ = stream.set_nodelay(true);
                tasks.spawn(write_loop(stream, peer, tx.subscribe(), cancel.clone()));
            }
            Err(e) => {
                warn!("accept error: {e}");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

async fn write_loop(
    stream: TcpStream,
    peer: SocketAddr,
    mut rx: broadcast::Receiver<Bytes>,
    cancel: CancellationToken,
) {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    let mut sink = FramedWrite::new(stream, codec);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => next,
        };

        match next {
            Ok(payload) => {
                // A subscriber that stops reading must not hold up `close`.
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = sink.send(payload) => sent,
                };
                if let Err(e) = sent {
                    debug!(%peer, "subscriber write failed: {e}");
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                trace!(%peer, skipped, "slow subscriber skipped payloads");
            }
            Err(RecvError::Closed) => break,
        }
    }

    debug!(%peer, "subscriber detached");
}

// ── Tests ────────────────────────────────────────────────────────
