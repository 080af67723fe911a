//! Aggregation loop: the single consumer of the frame store.
//!
//! On every tick it copies out the live streams' latest frames, samples
//! their byte counters for the rate estimate and hands each frame to a
//! [`FrameSink`]. The store lock is only held for the copy, never while the
//! sink runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use super::StreamId;
use super::store::FrameStore;
use crate::frame::DecodedFrame;

/// Upper bound on the poll interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(50);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

// ── FrameSink ────────────────────────────────────────────────────

/// Whatever shows (or records) the frames.
pub trait FrameSink: Send {
    /// Called once per live stream per tick. `rate` is bytes/second when
    /// rate display is enabled.
    fn consume(&mut self, id: StreamId, frame: &DecodedFrame, rate: Option<f64>);

    /// Checked after every tick; returning `true` ends the loop.
    fn should_stop(&self) -> bool {
        false
    }
}

/// Why [`AggregationLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationStop {
    /// Every supervisor has exited.
    WorkersFinished,
    /// The stop token fired.
    StopRequested,
    /// The sink asked to stop.
    SinkRequested,
}

// ── AggregationLoop ──────────────────────────────────────────────

pub struct AggregationLoop {
    store: Arc<FrameStore>,
    poll_interval: Duration,
    show_rate: bool,
    ticks: u64,
}

impl AggregationLoop {
    /// `poll_interval` is clamped to at most [`MAX_POLL_INTERVAL`].
    pub fn new(store: Arc<FrameStore>, poll_interval: Duration, show_rate: bool) -> Self {
        Self {
            store,
            poll_interval: poll_interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL),
            show_rate,
            ticks: 0,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// One pass over the live streams. Returns how many frames were handed
    /// to the sink.
    pub fn tick(&mut self, sink: &mut dyn FrameSink) -> usize {
        self.ticks += 1;
        let mut delivered = 0;

        for id in self.store.snapshot_keys() {
            // The stream may have been torn down since the key snapshot.
            let Some(snapshot) = self.store.get(id) else {
                continue;
            };
            let Some(frame) = snapshot.frame else {
                continue;
            };

            let rate = self.store.sample_rate(id, snapshot.cumulative_bytes);
            sink.consume(id, &frame, rate.filter(|_| self.show_rate));
            delivered += 1;
        }

        delivered
    }

    /// Tick until every worker in `workers` has exited (the tracker must be
    /// closed for that to happen), `stop` fires, or the sink asks to stop.
    pub async fn run(
        &mut self,
        sink: &mut dyn FrameSink,
        workers: &TaskTracker,
        stop: &CancellationToken,
    ) -> AggregationStop {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break AggregationStop::StopRequested,
                _ = interval.tick() => {}
            }

            if workers.is_closed() && workers.is_empty() {
                break AggregationStop::WorkersFinished;
            }

            self.tick(sink);
            if sink.should_stop() {
                break AggregationStop::SinkRequested;
            }
        };

        debug!(ticks = self.ticks, ?reason, "aggregation loop finished");
        reason
    }
}

// ── Tests ────────────────────────────────────────────────────────
