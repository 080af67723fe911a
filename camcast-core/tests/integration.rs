//! Integration tests: real TCP pub/sub, JPEG payloads, and the multi-stream
//! connect / timeout / teardown scenarios on localhost.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use camcast_core::{
    AggregationStop, CastError, Channel, Connector, DecodedFrame, Endpoint, FrameSink, JpegCodec,
    PixelFormat, PubSocket, Receiver, ReceiverConfig, StreamId, SubscribeOptions, TcpConnector,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

// ── Helpers ──────────────────────────────────────────────────────

fn gradient(w: u32, h: u32, shade: u8) -> DecodedFrame {
    let mut data = Vec::with_capacity((w * h * 3) as usize);
    for y in 0..h {
        for x in 0..w {
            data.extend_from_slice(&[(x * 8) as u8, (y * 8) as u8, shade]);
        }
    }
    DecodedFrame::new(w, h, PixelFormat::Rgb8, data).unwrap()
}

/// Bind a publisher on an OS-assigned localhost port.
async fn ephemeral_publisher() -> PubSocket {
    PubSocket::bind("127.0.0.1:0", 32).await.unwrap()
}

/// A localhost port with nothing listening on it.
async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// After `delay`, publish a JPEG frame every 20 ms until cancelled.
fn feed(socket: PubSocket, delay: Duration, cancel: CancellationToken) -> JoinHandle<u64> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => return 0,
            _ = tokio::time::sleep(delay) => {}
        }
        let codec = JpegCodec::new();
        let mut sent = 0u64;
        loop {
            let payload = codec.encode(&gradient(32, 24, sent as u8)).unwrap();
            socket.send(payload);
            sent += 1;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(20)) => {}
            }
        }
        socket.close().await;
        sent
    })
}

/// Maps the receiver's logical consecutive ports onto whatever ports the
/// test publishers actually bound.
struct MappedConnector {
    ports: HashMap<u16, u16>,
    inner: TcpConnector,
}

impl Connector for MappedConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Channel>, CastError> {
        let actual = self
            .ports
            .get(&endpoint.port())
            .copied()
            .ok_or_else(|| CastError::InvalidEndpoint(endpoint.to_string()))?;
        self.inner.connect(&endpoint.with_port(actual))
    }
}

/// Records which streams delivered frames and the last frame's shape.
#[derive(Clone, Default)]
struct SharedSink {
    seen: Arc<Mutex<BTreeSet<StreamId>>>,
    shape: Arc<Mutex<Option<(u32, u32, PixelFormat)>>>,
}

impl FrameSink for SharedSink {
    fn consume(&mut self, id: StreamId, frame: &DecodedFrame, _rate: Option<f64>) {
        self.seen.lock().unwrap().insert(id);
        *self.shape.lock().unwrap() = Some((frame.width(), frame.height(), frame.format()));
    }
}

const BASE: u16 = 9000;

fn receiver_config(count: u16, connect_timeout: Duration) -> ReceiverConfig {
    ReceiverConfig {
        endpoint: Endpoint::new("127.0.0.1", BASE),
        count,
        connect_timeout,
        recv_timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(20),
        show_rate: true,
    }
}

// ── Scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn test_late_and_silent_streams() {
    let a = ephemeral_publisher().await;
    let c = ephemeral_publisher().await;
    let ports = HashMap::from([
        (BASE, a.local_addr().port()),
        (BASE + 1, dead_port().await),
        (BASE + 2, c.local_addr().port()),
    ]);
    let connector = MappedConnector {
        ports,
        inner: TcpConnector::default(),
    };

    let producers = CancellationToken::new();
    let feed_a = feed(a, Duration::from_millis(200), producers.clone());
    let feed_c = feed(c, Duration::from_millis(900), producers.clone());

    let receiver = assert_ok!(Receiver::start(
        receiver_config(3, Duration::from_secs(1)),
        &connector,
        Arc::new(JpegCodec::new()),
    )
    .await);
    let store = Arc::clone(receiver.store());
    let stop = receiver.cancel_token();
    let started = Instant::now();

    let sink = SharedSink::default();
    let run = tokio::spawn({
        let mut sink = sink.clone();
        async move { receiver.run(&mut sink).await }
    });

    tokio::time::sleep(Duration::from_millis(1200).saturating_sub(started.elapsed())).await;
    let live: Vec<StreamId> = store.snapshot_keys();
    assert_eq!(live, vec![StreamId::from_port(BASE), StreamId::from_port(BASE + 2)]);

    stop.cancel();
    let report = run.await.unwrap();
    producers.cancel();
    assert!(feed_a.await.unwrap() > 0);
    assert!(feed_c.await.unwrap() > 0);

    assert_eq!(report.stop, AggregationStop::StopRequested);
    assert_eq!(report.timed_out, vec![StreamId::from_port(BASE + 1)]);
    assert_eq!(
        report.connected.iter().copied().collect::<BTreeSet<_>>(),
        BTreeSet::from([StreamId::from_port(BASE), StreamId::from_port(BASE + 2)])
    );
    assert!(report.faulted.is_empty());
    assert_eq!(report.streams.len(), 3);
    assert!(store.is_empty());

    assert!(sink.seen.lock().unwrap().contains(&StreamId::from_port(BASE)));
    assert_eq!(*sink.shape.lock().unwrap(), Some((32, 24, PixelFormat::Rgb8)));
}

#[tokio::test]
async fn test_cancellation_empties_store_promptly() {
    let a = ephemeral_publisher().await;
    let connector = MappedConnector {
        ports: HashMap::from([(BASE, a.local_addr().port())]),
        inner: TcpConnector::default(),
    };
    let producers = CancellationToken::new();
    let feeder = feed(a, Duration::ZERO, producers.clone());

    let config = receiver_config(1, Duration::from_secs(2));
    let recv_timeout = config.recv_timeout;
    let receiver = Receiver::start(config, &connector, Arc::new(JpegCodec::new()))
        .await
        .unwrap();
    let store = Arc::clone(receiver.store());
    let stop = receiver.cancel_token();
    let run = tokio::spawn(async move { receiver.run(&mut SharedSink::default()).await });

    let deadline = Instant::now() + Duration::from_secs(2);
    while store.get(StreamId::from_port(BASE)).and_then(|s| s.frame).is_none() {
        assert!(Instant::now() < deadline, "stream never produced a frame");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let cancelled_at = Instant::now();
    stop.cancel();
    let report = run.await.unwrap();
    assert!(store.is_empty());
    assert!(cancelled_at.elapsed() < recv_timeout * 4);
    assert!(report.total_frames() > 0);

    producers.cancel();
    feeder.await.unwrap();
}

#[tokio::test]
async fn test_corrupt_payloads_keep_last_good_frame() {
    let publisher = ephemeral_publisher().await;
    let connector = MappedConnector {
        ports: HashMap::from([(BASE, publisher.local_addr().port())]),
        inner: TcpConnector::new(SubscribeOptions {
            conflate: false,
            ..Default::default()
        }),
    };
    let receiver = Receiver::start(
        receiver_config(1, Duration::from_secs(2)),
        &connector,
        Arc::new(JpegCodec::new()),
    )
    .await
    .unwrap();
    let store = Arc::clone(receiver.store());
    let stop = receiver.cancel_token();
    let run = tokio::spawn(async move { receiver.run(&mut SharedSink::default()).await });

    // Nothing may be published before the subscriber is attached.
    let deadline = Instant::now() + Duration::from_secs(2);
    while publisher.subscriber_count() == 0 {
        assert!(Instant::now() < deadline, "subscriber never attached");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let codec = JpegCodec::with_quality(80);
    publisher.send(Bytes::from_static(b"hello")); // liveness only
    publisher.send(codec.encode(&gradient(16, 16, 1)).unwrap());
    for _ in 0..5 {
        publisher.send(Bytes::from_static(b"!!! not base64 !!!"));
    }
    publisher.send(Bytes::from_static(b"aGVsbG8="));

    let id = StreamId::from_port(BASE);
    let deadline = Instant::now() + Duration::from_secs(2);
    while store.get(id).and_then(|s| s.frame).is_none() {
        assert!(Instant::now() < deadline, "valid frame never stored");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = store.get(id).unwrap();
    assert_eq!(snapshot.frames, 1);
    let frame = snapshot.frame.unwrap();
    assert_eq!((frame.width(), frame.height()), (16, 16));

    stop.cancel();
    let report = run.await.unwrap();
    assert_eq!(report.streams[0].frames, 1);
    assert_eq!(report.streams[0].decode_failures, 6);
    publisher.close().await;
}

#[tokio::test]
async fn test_publisher_restart_is_not_a_fault() {
    let first = ephemeral_publisher().await;
    let addr = first.local_addr();
    let mut channel = TcpConnector::default()
        .connect(&Endpoint::new("127.0.0.1", addr.port()))
        .unwrap();

    let cancel = CancellationToken::new();
    let feeder = feed(first, Duration::ZERO, cancel.clone());
    assert_ok!(channel.recv(Duration::from_secs(2)).await);

    cancel.cancel();
    feeder.await.unwrap();

    let second = PubSocket::bind(addr, 32).await.unwrap();
    let cancel = CancellationToken::new();
    let feeder = feed(second, Duration::ZERO, cancel.clone());
    assert_ok!(channel.recv(Duration::from_secs(3)).await);

    cancel.cancel();
    feeder.await.unwrap();
    channel.close().await;
}
