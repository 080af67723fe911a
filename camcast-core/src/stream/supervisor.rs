//! Stream supervisor: the whole life of one subscription.
//!
//! 1. [`ConnectionGate`] waits for the first message.
//! 2. The stream's entry is activated in the [`FrameStore`].
//! 3. Receive → decode → `put`, until cancelled or the transport breaks.
//! 4. Teardown: close the channel, remove the entry and its rate state.
//!
//! Receive timeouts are routine and decode failures drop only the offending
//! message. Neither ends the loop. Decoding runs on the blocking pool so one
//! slow stream never holds up another.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::gate::ConnectionGate;
use super::pool::StreamEvent;
use super::store::FrameStore;
use super::StreamId;
use crate::codec::FrameDecoder;
use crate::error::{CastError, DecodeError};
use crate::frame::DecodedFrame;
use crate::transport::Channel;

// ── SupervisorConfig ─────────────────────────────────────────────

/// Per-stream timing.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// How long to wait for the first message before giving up.
    pub connect_timeout: Duration,
    /// Bound on every receive; also the worst-case cancellation latency.
    pub recv_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            recv_timeout: Duration::from_millis(500),
        }
    }
}

// ── StreamOutcome / StreamReport ─────────────────────────────────

/// Why a supervisor finished.
#[derive(Debug)]
pub enum StreamOutcome {
    /// Cancellation was requested.
    Stopped,
    /// No message arrived before the connect deadline; never activated.
    ConnectTimeout,
    /// The transport failed; only this stream was torn down.
    Fault(CastError),
}

/// Summary returned by [`StreamSupervisor::run`].
#[derive(Debug)]
pub struct StreamReport {
    pub id: StreamId,
    pub outcome: StreamOutcome,
    /// Time from start to first message, if the stream connected.
    pub connected_after: Option<Duration>,
    /// Frames decoded and stored.
    pub frames: u64,
    /// Payload bytes of the stored frames.
    pub bytes: u64,
    /// Payloads dropped because they did not decode.
    pub decode_failures: u64,
}

impl StreamReport {
    fn new(id: StreamId) -> Self {
        Self {
            id,
            outcome: StreamOutcome::Stopped,
            connected_after: None,
            frames: 0,
            bytes: 0,
            decode_failures: 0,
        }
    }
}

// ── StreamSupervisor ─────────────────────────────────────────────

/// Owns one channel and drives it until shutdown.
pub struct StreamSupervisor {
    id: StreamId,
    channel: Box<dyn Channel>,
    decoder: Arc<dyn FrameDecoder>,
    store: Arc<FrameStore>,
    config: SupervisorConfig,
    events: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl StreamSupervisor {
    pub fn new(
        id: StreamId,
        channel: Box<dyn Channel>,
        decoder: Arc<dyn FrameDecoder>,
        store: Arc<FrameStore>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            id,
            channel,
            decoder,
            store,
            config,
            events: None,
        }
    }

    /// Report `StreamEvent::Connected` on `events` once the gate opens.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<StreamEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Run the stream to completion.
    pub async fn run(mut self, cancel: CancellationToken) -> StreamReport {
        let id = self.id;
        let mut report = StreamReport::new(id);
        let mut gate = ConnectionGate::new(self.config.connect_timeout, self.config.recv_timeout);

        match gate.wait(self.channel.as_mut(), &cancel).await {
            Ok(took) => {
                info!(stream = %id, after_ms = took.as_millis() as u64, "stream connected");
                report.connected_after = Some(took);
                self.store.activate(id);
                if let Some(events) = &self.events {
                    let _ = events.send(StreamEvent::Connected(id));
                }
            }
            Err(CastError::Cancelled) => {
                debug!(stream = %id, "cancelled before connecting");
                self.channel.close().await;
                return report;
            }
            Err(CastError::ConnectTimeout(deadline)) => {
                warn!(stream = %id, ?deadline, "no producer answered; giving up on stream");
                self.channel.close().await;
                report.outcome = StreamOutcome::ConnectTimeout;
                return report;
            }
            Err(e) => {
                warn!(stream = %id, "transport failed while connecting: {e}");
                self.channel.close().await;
                report.outcome = StreamOutcome::Fault(e);
                return report;
            }
        }

        let outcome = self.receive_loop(&cancel, &mut report).await;
        report.outcome = outcome;

        self.channel.close().await;
        self.store.remove(id);
        info!(
            stream = %id,
            frames = report.frames,
            decode_failures = report.decode_failures,
            "stream torn down"
        );
        report
    }

    async fn receive_loop(
        &mut self,
        cancel: &CancellationToken,
        report: &mut StreamReport,
    ) -> StreamOutcome {
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamOutcome::Stopped,
                received = self.channel.recv(self.config.recv_timeout) => received,
            };

            let payload = match received {
                Ok(payload) => payload,
                Err(e) if e.is_timeout() => continue,
                Err(e) => {
                    warn!(stream = %self.id, "transport fault: {e}");
                    return StreamOutcome::Fault(e);
                }
            };

            let byte_len = payload.len() as u64;
            match decode_blocking(Arc::clone(&self.decoder), payload).await {
                Ok(frame) => {
                    self.store.put(self.id, frame, byte_len);
                    report.frames += 1;
                    report.bytes += byte_len;
                }
                Err(e) => {
                    report.decode_failures += 1;
                    trace!(stream = %self.id, "dropping undecodable payload: {e}");
                }
            }
        }
    }
}

/// Decode on the blocking pool. Takes owned handles so no borrow of the
/// supervisor (and its non-`Sync` channel) lives across the await.
async fn decode_blocking(
    decoder: Arc<dyn FrameDecoder>,
    payload: Bytes,
) -> Result<DecodedFrame, DecodeError> {
    tokio::task::spawn_blocking(move || decoder.decode(&payload))
        .await
        .unwrap_or_else(|_| Err(DecodeError::Aborted))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::frame::PixelFormat;
    use crate::transport::{MemoryChannel, MemorySender};

    const ID: StreamId = StreamId::new(5555);

    /// Payload `[n]` decodes to a 1×1 gray frame of value `n`; `0xFF` is
    /// treated as corrupt.
    struct ByteDecoder;

    impl FrameDecoder for ByteDecoder {
        fn decode(&self, payload: &[u8]) -> Result<DecodedFrame, DecodeError> {
            match payload {
                [0xFF] | [] => Err(DecodeError::EmptyPayload),
                [v] => DecodedFrame::new(1, 1, PixelFormat::Gray8, vec![*v]),
                _ => Err(DecodeError::EmptyPayload),
            }
        }
    }

    fn config() -> SupervisorConfig {
        SupervisorConfig {
            connect_timeout: Duration::from_millis(300),
            recv_timeout: Duration::from_millis(20),
        }
    }

    fn supervisor(store: &Arc<FrameStore>) -> (MemorySender, StreamSupervisor) {
        let (tx, channel) = MemoryChannel::pair(false);
        let sup = StreamSupervisor::new(
            ID,
            Box::new(channel),
            Arc::new(ByteDecoder),
            Arc::clone(store),
            config(),
        );
        (tx, sup)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        let started = Instant::now();
        while !cond() {
            assert!(started.elapsed() < Duration::from_secs(2), "condition never held");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn gray(v: u8) -> DecodedFrame {
        DecodedFrame::new(1, 1, PixelFormat::Gray8, vec![v]).unwrap()
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn run_future_can_be_spawned() {
        let store = Arc::new(FrameStore::new());
        let (_tx, sup) = supervisor(&store);
        let run = sup.run(CancellationToken::new());
        assert_send(&run);
    }

    #[tokio::test]
    async fn decoder_panic_becomes_aborted() {
        struct Panicky;
        impl FrameDecoder for Panicky {
            fn decode(&self, _payload: &[u8]) -> Result<DecodedFrame, DecodeError> {
                panic!("decoder blew up");
            }
        }
        let err = decode_blocking(Arc::new(Panicky), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::Aborted));
    }

    #[tokio::test]
    async fn silent_stream_never_creates_an_entry() {
        let store = Arc::new(FrameStore::new());
        let (_tx, sup) = supervisor(&store);

        let report = sup.run(CancellationToken::new()).await;
        assert!(matches!(report.outcome, StreamOutcome::ConnectTimeout));
        assert!(report.connected_after.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn frames_land_in_store_and_teardown_removes_them() {
        let store = Arc::new(FrameStore::new());
        let (tx, sup) = supervisor(&store);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sup.run(cancel.clone()));

        tx.send(vec![0u8]).unwrap(); // liveness only
        tx.send(vec![7u8]).unwrap();
        wait_until(|| store.get(ID).is_some_and(|s| s.frame.is_some())).await;

        let snap = store.get(ID).unwrap();
        assert_eq!(snap.frame, Some(gray(7)));
        assert_eq!(snap.cumulative_bytes, 1);

        cancel.cancel();
        let report = handle.await.unwrap();
        assert!(matches!(report.outcome, StreamOutcome::Stopped));
        assert_eq!(report.frames, 1);
        assert!(store.get(ID).is_none());
    }

    #[tokio::test]
    async fn corrupt_payloads_keep_last_good_frame() {
        let store = Arc::new(FrameStore::new());
        let (tx, sup) = supervisor(&store);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sup.run(cancel.clone()));

        tx.send(vec![0u8]).unwrap();
        tx.send(vec![42u8]).unwrap();
        wait_until(|| store.get(ID).is_some_and(|s| s.frames == 1)).await;

        for _ in 0..10 {
            tx.send(vec![0xFFu8]).unwrap();
        }
        // A valid marker after the garbage proves every bad payload was processed.
        tx.send(vec![43u8]).unwrap();
        wait_until(|| store.get(ID).is_some_and(|s| s.frames == 2)).await;

        let snap = store.get(ID).unwrap();
        assert_eq!(snap.frame, Some(gray(43)));
        assert_eq!(snap.cumulative_bytes, 2);

        cancel.cancel();
        let report = handle.await.unwrap();
        assert_eq!(report.decode_failures, 10);
    }

    #[tokio::test]
    async fn only_corrupt_payloads_leave_entry_empty() {
        let store = Arc::new(FrameStore::new());
        let (tx, sup) = supervisor(&store);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sup.run(cancel.clone()));

        tx.send(vec![0u8]).unwrap();
        wait_until(|| store.contains(ID)).await;
        tx.send(vec![0xFFu8]).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snap = store.get(ID).unwrap();
        assert!(snap.frame.is_none());
        assert_eq!(snap.cumulative_bytes, 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn transport_fault_tears_down_only_this_stream() {
        let store = Arc::new(FrameStore::new());
        let other = StreamId::new(9999);
        store.activate(other);

        let (tx, sup) = supervisor(&store);
        let handle = tokio::spawn(sup.run(CancellationToken::new()));

        tx.send(vec![0u8]).unwrap();
        tx.send(vec![5u8]).unwrap();
        wait_until(|| store.get(ID).is_some_and(|s| s.frames == 1)).await;
        drop(tx);

        let report = handle.await.unwrap();
        assert!(matches!(report.outcome, StreamOutcome::Fault(CastError::ChannelClosed)));
        assert!(!store.contains(ID));
        assert!(store.contains(other));
    }

    #[tokio::test]
    async fn cancellation_is_observed_within_receive_window() {
        let store = Arc::new(FrameStore::new());
        let (tx, sup) = supervisor(&store);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sup.run(cancel.clone()));

        tx.send(vec![0u8]).unwrap();
        wait_until(|| store.contains(ID)).await;

        let started = Instant::now();
        cancel.cancel();
        wait_until(|| store.is_empty()).await;
        assert!(started.elapsed() < config().recv_timeout * 5);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn connected_event_is_emitted() {
        let store = Arc::new(FrameStore::new());
        let (tx, sup) = supervisor(&store);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sup.with_events(events_tx).run(cancel.clone()));

        tx.send(vec![0u8]).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), events_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, StreamEvent::Connected(id) if id == ID));

        cancel.cancel();
        handle.await.unwrap();
    }
}
