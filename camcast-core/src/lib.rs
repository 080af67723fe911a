//! # camcast-core
//!
//! Multi-stream frame reception and aggregation.
//!
//! This crate contains:
//! - **Transport**: `PubSocket`/`SubSocket` length-delimited TCP pub/sub, the
//!   `Channel` trait and an in-process `MemoryChannel`
//! - **Codec**: `JpegCodec` (base64-wrapped JPEG) behind the `FrameDecoder` trait
//! - **Stream engine**: `ConnectionGate`, `StreamSupervisor`, `StreamPool`,
//!   `FrameStore`, `RateEstimator` and `AggregationLoop`
//! - **Receiver**: wires N consecutive ports into one aggregated view
//! - **Producer**: `StreamPublisher` driving a `FrameSource`
//! - **Discovery**: UDP beacon and listener
//! - **Signal**: Ctrl-C / SIGTERM shutdown for the binaries
//! - **Error**: `CastError` / `DecodeError`, `thiserror`-based

pub mod codec;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod producer;
pub mod receiver;
pub mod signal;
pub mod stream;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{DEFAULT_JPEG_QUALITY, FrameDecoder, JpegCodec};
pub use discovery::{Beacon, DISCOVERY_PORT, discover};
pub use error::{CastError, DecodeError};
pub use frame::{DecodedFrame, PixelFormat};
pub use producer::{FrameSource, PublisherConfig, PublisherStats, StreamPublisher};
pub use receiver::{Receiver, ReceiverConfig, ReceiverReport};
pub use signal::shutdown_signal;
pub use stream::{
    AggregationLoop, AggregationStop, ConnectionGate, ConnectionState, FrameSink, FrameStore,
    RateEstimator, StreamId, StreamOutcome, StreamReport, format_rate,
};
pub use transport::{
    Channel, Connector, Endpoint, MemoryChannel, MemorySender, PubSocket, SubSocket,
    SubscribeOptions, TcpConnector,
};
