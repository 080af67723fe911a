//! Publish/subscribe transport for frame payloads.
//!
//! ```text
//! PRODUCER                                     VIEWER
//! ┌──────────────┐   length-delimited TCP   ┌──────────────┐
//! │ PubSocket    │ ───────────────────────► │ SubSocket    │──► Channel::recv
//! │  broadcast   │   (one writer task per   │  watch slot  │
//! │  fan-out     │    subscriber)           │  or mpsc     │
//! └──────────────┘                          └──────────────┘
//! ```
//!
//! The supervisor only sees the [`Channel`] trait. [`TcpConnector`] builds
//! [`SubSocket`]s; [`MemoryChannel`] is the in-process equivalent.

pub mod memory;
pub mod publisher;
pub mod subscriber;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CastError;

pub use memory::{MemoryChannel, MemorySender};
pub use publisher::PubSocket;
pub use subscriber::{SubSocket, SubscribeOptions};

/// Largest payload either side of the TCP transport will frame.
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

// ── Endpoint ─────────────────────────────────────────────────────

/// A producer address, written `tcp://host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `tcp://host:port` or bare `host:port`.
    pub fn parse(text: &str) -> Result<Self, CastError> {
        let text = text.trim();
        let rest = text.strip_prefix("tcp://").unwrap_or(text);
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| CastError::InvalidEndpoint(format!("missing port in {text:?}")))?;
        if host.is_empty() {
            return Err(CastError::InvalidEndpoint(format!("missing host in {text:?}")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| CastError::InvalidEndpoint(format!("bad port in {text:?}")))?;
        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Same host, different port.
    pub fn with_port(&self, port: u16) -> Self {
        Self::new(self.host.clone(), port)
    }

    /// `host:port` form, suitable for `TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for Endpoint {
    type Err = CastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ── Channel ──────────────────────────────────────────────────────

/// One subscription to one logical stream.
#[async_trait]
pub trait Channel: Send {
    /// Wait up to `timeout` for the next payload.
    ///
    /// Returns [`CastError::Timeout`] when nothing arrived in time; any other
    /// error means the subscription is unusable.
    async fn recv(&mut self, timeout: Duration) -> Result<Bytes, CastError>;

    /// Release the subscription. Idempotent.
    async fn close(&mut self);
}

// ── Connector ────────────────────────────────────────────────────

/// Creates channels for endpoints.
///
/// Connecting is lazy: the returned channel may not have reached its
/// producer yet. Whether a producer is alive is decided by the connection
/// gate, not here.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Channel>, CastError>;
}

/// Connector producing reconnecting TCP [`SubSocket`]s.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    options: SubscribeOptions,
}

impl TcpConnector {
    pub fn new(options: SubscribeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SubscribeOptions {
        &self.options
    }
}

impl Connector for TcpConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Channel>, CastError> {
        Ok(Box::new(SubSocket::connect(endpoint.clone(), self.options.clone())))
    }
}

// ── Tests ────────────────────────────────────────────────────────
