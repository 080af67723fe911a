//! Stream pool: spawns supervisors, shares one cancellation token between
//! them and waits for every teardown on shutdown.
//!
//! Lifecycle events flow back on an unbounded channel so a supervisor never
//! waits on whoever is (or is not) listening.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::StreamId;
use super::store::FrameStore;
use super::supervisor::{StreamReport, StreamSupervisor, SupervisorConfig};
use crate::codec::FrameDecoder;
use crate::transport::Channel;

/// Lifecycle notifications from supervisors.
#[derive(Debug)]
pub enum StreamEvent {
    /// The stream's first message arrived and its entry was activated.
    Connected(StreamId),
    /// The supervisor has finished, including teardown.
    Finished(StreamReport),
}

pub type StreamEventReceiver = mpsc::UnboundedReceiver<StreamEvent>;

/// Set of running stream supervisors.
pub struct StreamPool {
    store: Arc<FrameStore>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    events_tx: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl StreamPool {
    /// Create a pool writing into `store`.
    pub fn new(store: Arc<FrameStore>) -> (Self, StreamEventReceiver) {
        Self::with_cancel(store, CancellationToken::new())
    }

    /// Create a pool whose supervisors also stop when `parent` is cancelled.
    pub fn with_cancel(
        store: Arc<FrameStore>,
        parent: CancellationToken,
    ) -> (Self, StreamEventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pool = Self {
            store,
            cancel: parent.child_token(),
            tracker: TaskTracker::new(),
            events_tx: Some(events_tx),
        };
        (pool, events_rx)
    }

    pub fn store(&self) -> &Arc<FrameStore> {
        &self.store
    }

    /// Token shared by every supervisor of this pool.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tracker over the supervisor tasks (closed once spawning is over).
    pub fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    /// Spawn a supervisor for `id` reading from `channel`.
    ///
    /// Ids must be unique within a pool. Returns `false` if the pool no
    /// longer accepts streams.
    pub fn spawn(
        &self,
        id: StreamId,
        channel: Box<dyn Channel>,
        decoder: Arc<dyn FrameDecoder>,
        config: SupervisorConfig,
    ) -> bool {
        let Some(events) = self.events_tx.clone() else {
            return false;
        };

        let supervisor = StreamSupervisor::new(id, channel, decoder, Arc::clone(&self.store), config)
            .with_events(events.clone());
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            let report = supervisor.run(cancel).await;
            let _ = events.send(StreamEvent::Finished(report));
        });
        true
    }

    /// Number of supervisors still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting new streams. The event channel ends once every
    /// running supervisor has finished.
    pub fn close(&mut self) {
        self.tracker.close();
        self.events_tx = None;
    }

    /// Wait for every supervisor to finish (call [`close`](Self::close) first).
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Cancel every supervisor and wait until all have torn down.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        self.close();
        self.tracker.wait().await;
    }
}

// ── Tests ────────────────────────────────────────────────────────
