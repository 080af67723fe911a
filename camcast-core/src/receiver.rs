//! Receiver: wires N subscriptions, their supervisors and the aggregation
//! loop together and reports how every stream ended.
//!
//! Stream `i` is subscribed on `base_port + i` of the base endpoint and is
//! identified by [`StreamId::from_port`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::FrameDecoder;
use crate::error::CastError;
use crate::stream::{
    AggregationLoop, AggregationStop, FrameSink, FrameStore, StreamEvent, StreamEventReceiver,
    StreamId, StreamOutcome, StreamPool, StreamReport, SupervisorConfig,
};
use crate::transport::{Connector, Endpoint};

// ── ReceiverConfig ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Host and first port; stream `i` uses `port + i`.
    pub endpoint: Endpoint,
    /// Number of consecutive ports to subscribe to.
    pub count: u16,
    pub connect_timeout: Duration,
    pub recv_timeout: Duration,
    pub poll_interval: Duration,
    pub show_rate: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::new("0.0.0.0", 5555),
            count: 1,
            connect_timeout: Duration::from_secs(10),
            recv_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(30),
            show_rate: false,
        }
    }
}

impl ReceiverConfig {
    /// Endpoints of every stream, in port order.
    pub fn endpoints(&self) -> Result<Vec<Endpoint>, CastError> {
        let base = self.endpoint.port();
        (0..self.count)
            .map(|i| {
                base.checked_add(i)
                    .map(|port| self.endpoint.with_port(port))
                    .ok_or_else(|| {
                        CastError::InvalidEndpoint(format!(
                            "port range {base}+{} overflows",
                            self.count
                        ))
                    })
            })
            .collect()
    }

    fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            connect_timeout: self.connect_timeout,
            recv_timeout: self.recv_timeout,
        }
    }
}

// ── ReceiverReport ───────────────────────────────────────────────

/// Final tally once every stream has torn down.
#[derive(Debug)]
pub struct ReceiverReport {
    /// Streams whose gate opened, in connection order.
    pub connected: Vec<StreamId>,
    /// Streams that never produced a message before their deadline.
    pub timed_out: Vec<StreamId>,
    /// Streams that ended on a transport fault.
    pub faulted: Vec<StreamId>,
    /// Per-stream reports, sorted by id.
    pub streams: Vec<StreamReport>,
    pub stop: AggregationStop,
}

impl ReceiverReport {
    pub fn total_frames(&self) -> u64 {
        self.streams.iter().map(|s| s.frames).sum()
    }
}

#[derive(Default)]
struct EventTally {
    connected: Vec<StreamId>,
    timed_out: Vec<StreamId>,
    faulted: Vec<StreamId>,
    streams: Vec<StreamReport>,
}

async fn collect_events(mut events: StreamEventReceiver) -> EventTally {
    let mut tally = EventTally::default();
    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Connected(id) => tally.connected.push(id),
            StreamEvent::Finished(report) => {
                match &report.outcome {
                    StreamOutcome::ConnectTimeout => tally.timed_out.push(report.id),
                    StreamOutcome::Fault(e) => {
                        warn!(stream = %report.id, "stream faulted: {e}");
                        tally.faulted.push(report.id);
                    }
                    StreamOutcome::Stopped => {}
                }
                tally.streams.push(report);
            }
        }
    }
    tally.streams.sort_by_key(|r| r.id);
    tally
}

// ── Receiver ─────────────────────────────────────────────────────

/// A running set of subscriptions.
pub struct Receiver {
    config: ReceiverConfig,
    pool: StreamPool,
    events: StreamEventReceiver,
    stop: CancellationToken,
}

impl Receiver {
    /// Subscribe to every configured endpoint and start its supervisor.
    pub async fn start(
        config: ReceiverConfig,
        connector: &dyn Connector,
        decoder: Arc<dyn FrameDecoder>,
    ) -> Result<Self, CastError> {
        Self::start_with_cancel(config, connector, decoder, CancellationToken::new()).await
    }

    /// As [`start`](Self::start), stopping everything when `stop` fires.
    ///
    /// If any endpoint fails to connect, the streams already started are
    /// cancelled and fully torn down before the error is returned.
    pub async fn start_with_cancel(
        config: ReceiverConfig,
        connector: &dyn Connector,
        decoder: Arc<dyn FrameDecoder>,
        stop: CancellationToken,
    ) -> Result<Self, CastError> {
        let endpoints = config.endpoints()?;
        let store = Arc::new(FrameStore::new());
        let (mut pool, events) = StreamPool::with_cancel(store, stop.clone());

        for endpoint in &endpoints {
            let channel = match connector.connect(endpoint) {
                Ok(channel) => channel,
                Err(e) => {
                    warn!("cannot subscribe to {endpoint}: {e}");
                    pool.shutdown().await;
                    return Err(e);
                }
            };
            let id = StreamId::from_port(endpoint.port());
            pool.spawn(id, channel, Arc::clone(&decoder), config.supervisor());
            info!(stream = %id, "Started receiver for {endpoint}");
        }
        pool.close();

        Ok(Self {
            config,
            pool,
            events,
            stop,
        })
    }

    pub fn store(&self) -> &Arc<FrameStore> {
        self.pool.store()
    }

    /// Cancelling this token stops the aggregation loop and every stream.
    pub fn cancel_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Aggregate into `sink` until every stream has ended, the cancel token
    /// fires or the sink asks to stop; then tear everything down.
    pub async fn run(self, sink: &mut dyn FrameSink) -> ReceiverReport {
        let Self {
            config,
            mut pool,
            events,
            stop,
        } = self;

        let collector = tokio::spawn(collect_events(events));

        let mut aggregation = AggregationLoop::new(
            Arc::clone(pool.store()),
            config.poll_interval,
            config.show_rate,
        );
        let reason = aggregation.run(sink, &pool.tracker(), &stop).await;
        debug!(?reason, "aggregation stopped; shutting streams down");

        pool.shutdown().await;
        let tally = collector.await.unwrap_or_else(|e| {
            warn!("event collector failed: {e}");
            EventTally::default()
        });

        info!(
            connected = tally.connected.len(),
            timed_out = tally.timed_out.len(),
            faulted = tally.faulted.len(),
            "All receivers stopped"
        );

        ReceiverReport {
            connected: tally.connected,
            timed_out: tally.timed_out,
            faulted: tally.faulted,
            streams: tally.streams,
            stop: reason,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
