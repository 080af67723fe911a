//! Reconnecting TCP subscriber.
//!
//! [`SubSocket::connect`] returns immediately. A background task keeps
//! dialling the producer, reads length-delimited payloads, and drops them
//! into an inbox. If the producer goes away the task dials again, so a
//! restarted camera is picked up without the viewer noticing anything but a
//! gap in frames.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{Channel, Endpoint, MAX_FRAME_LENGTH};
use crate::error::CastError;

// ── SubscribeOptions ─────────────────────────────────────────────

/// Tuning for a [`SubSocket`].
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// Keep only the newest undelivered payload.
    pub conflate: bool,
    /// Inbox depth when `conflate` is off. Payloads beyond it are dropped.
    pub queue_depth: usize,
    /// Pause between connection attempts.
    pub reconnect_interval: Duration,
    /// Largest accepted payload in bytes.
    pub max_frame_length: usize,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            conflate: true,
            queue_depth: 16,
            reconnect_interval: Duration::from_millis(100),
            max_frame_length: MAX_FRAME_LENGTH,
        }
    }
}

// ── Inbox ────────────────────────────────────────────────────────

enum Inbox {
    Latest(watch::Receiver<Option<Bytes>>),
    Queue(mpsc::Receiver<Bytes>),
}

enum Outbox {
    Latest(watch::Sender<Option<Bytes>>),
    Queue(mpsc::Sender<Bytes>),
}

impl Outbox {
    /// Returns `false` once the subscriber side has gone away.
    fn deliver(&self, payload: Bytes) -> bool {
        match self {
            Outbox::Latest(tx) => tx.send(Some(payload)).is_ok(),
            Outbox::Queue(tx) => match tx.try_send(payload) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!("subscriber inbox full; dropping payload");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
        }
    }

    fn is_closed(&self) -> bool {
        match self {
            Outbox::Latest(tx) => tx.is_closed(),
            Outbox::Queue(tx) => tx.is_closed(),
        }
    }
}

// ── SubSocket ────────────────────────────────────────────────────

/// Subscription to a single [`PubSocket`](super::PubSocket).
pub struct SubSocket {
    endpoint: Endpoint,
    inbox: Inbox,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl SubSocket {
    /// Start subscribing to `endpoint`. Must be called inside a Tokio runtime.
    pub fn connect(endpoint: Endpoint, options: SubscribeOptions) -> Self {
        let (outbox, inbox) = if options.conflate {
            let (tx, rx) = watch::channel(None);
            (Outbox::Latest(tx), Inbox::Latest(rx))
        } else {
            let (tx, rx) = mpsc::channel(options.queue_depth.max(1));
            (Outbox::Queue(tx), Inbox::Queue(rx))
        };

        let cancel = CancellationToken::new();
        let reader = tokio::spawn(read_loop(
            endpoint.clone(),
            options,
            outbox,
            cancel.clone(),
        ));

        Self {
            endpoint,
            inbox,
            cancel,
            reader: Some(reader),
        }
    }

    /// The producer this socket subscribes to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Channel for SubSocket {
    async fn recv(&mut self, timeout: Duration) -> Result<Bytes, CastError> {
        match &mut self.inbox {
            Inbox::Latest(rx) => match tokio::time::timeout(timeout, rx.changed()).await {
                Err(_) => Err(CastError::Timeout(timeout)),
                Ok(Err(_)) => Err(CastError::ChannelClosed),
                Ok(Ok(())) => rx
                    .borrow_and_update()
                    .clone()
                    .ok_or(CastError::Timeout(timeout)),
            },
            Inbox::Queue(rx) => match tokio::time::timeout(timeout, rx.recv()).await {
                Err(_) => Err(CastError::Timeout(timeout)),
                Ok(None) => Err(CastError::ChannelClosed),
                Ok(Some(payload)) => Ok(payload),
            },
        }
    }

    async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
    }
}

impl Drop for SubSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Background reader ────────────────────────────────────────────

async fn read_loop(
    endpoint: Endpoint,
    options: SubscribeOptions,
    outbox: Outbox,
    cancel: CancellationToken,
) {
    let addr = endpoint.socket_addr();

    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = TcpStream::connect(&addr) => result,
        };

        match connected {
            Ok(stream) => {
                debug!(%endpoint, "connected to publisher");
                let _ = stream.set_nodelay(true);
                let codec = LengthDelimitedCodec::builder()
                    .max_frame_length(options.max_frame_length)
                    .new_codec();
                let mut frames = FramedRead::new(stream, codec);

                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => return,
                        next = frames.next() => next,
                    };
                    match next {
                        Some(Ok(payload)) => {
                            if !outbox.deliver(payload.freeze()) {
                                return;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(%endpoint, "read error: {e}; reconnecting");
                            break;
                        }
                        None => {
                            debug!(%endpoint, "publisher closed the connection; reconnecting");
                            break;
                        }
                    }
                }
            }
            Err(e) => trace!(%endpoint, "connect failed: {e}"),
        }

        if outbox.is_closed() {
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(options.reconnect_interval) => {}
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
