//! One-shot UDP discovery.
//!
//! A producer announces `IP_BROADCASTER:tcp://<ip>:<port>` on the discovery
//! port a fixed number of times; a viewer listens for the first well-formed
//! announcement and subscribes to the endpoint it names.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error::CastError;
use crate::transport::Endpoint;

/// UDP port announcements are sent to.
pub const DISCOVERY_PORT: u16 = 5556;

/// Prefix of every announcement datagram.
pub const BEACON_PREFIX: &str = "IP_BROADCASTER:";

/// Default number of announcements per [`Beacon::announce`].
pub const DEFAULT_ROUNDS: u32 = 10;

/// Default gap between announcements.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

const MAX_DATAGRAM: usize = 1024;

/// Announcement text for `endpoint`.
pub fn announcement(endpoint: &Endpoint) -> String {
    format!("{BEACON_PREFIX}{endpoint}")
}

/// Extract the endpoint from an announcement, if it is one.
pub fn parse_announcement(datagram: &[u8]) -> Option<Endpoint> {
    let text = std::str::from_utf8(datagram).ok()?;
    let rest = text.trim().strip_prefix(BEACON_PREFIX)?;
    Endpoint::parse(rest).ok()
}

// ── Beacon ───────────────────────────────────────────────────────

/// Sends announcements from an ephemeral, broadcast-enabled socket.
pub struct Beacon {
    socket: UdpSocket,
}

impl Beacon {
    /// Bind an ephemeral socket with `SO_BROADCAST` set.
    pub async fn bind() -> Result<Self, CastError> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
        socket.set_broadcast(true)?;
        Ok(Self { socket })
    }

    /// Announce `endpoint` to `target` `rounds` times, `interval` apart.
    ///
    /// Returns how many announcements were sent before finishing or being
    /// cancelled.
    pub async fn announce(
        &self,
        endpoint: &Endpoint,
        target: SocketAddr,
        rounds: u32,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<u32, CastError> {
        let message = announcement(endpoint);
        info!(%endpoint, %target, rounds, "announcing");

        let mut sent = 0;
        while sent < rounds {
            self.socket.send_to(message.as_bytes(), target).await?;
            sent += 1;
            trace!(round = sent, "announcement sent");

            if sent == rounds {
                break;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        debug!(sent, "announcements finished");
        Ok(sent)
    }
}

// ── Listening ────────────────────────────────────────────────────

/// Listen on `0.0.0.0:bind_port` for the first announcement.
///
/// Returns `Ok(None)` when `timeout` elapses without one.
pub async fn discover(bind_port: u16, timeout: Duration) -> Result<Option<Endpoint>, CastError> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, bind_port))).await?;
    discover_on(&socket, timeout).await
}

/// Like [`discover`], on an already bound socket.
pub async fn discover_on(socket: &UdpSocket, timeout: Duration) -> Result<Option<Endpoint>, CastError> {
    let mut buf = [0u8; MAX_DATAGRAM];

    let found = tokio::time::timeout(timeout, async {
        loop {
            let (len, from) = socket.recv_from(&mut buf).await?;
            match parse_announcement(&buf[..len]) {
                Some(endpoint) => {
                    info!(%endpoint, %from, "broadcaster found");
                    return Ok::<_, CastError>(endpoint);
                }
                None => trace!(%from, len, "ignoring non-announcement datagram"),
            }
        }
    })
    .await;

    match found {
        Ok(result) => result.map(Some),
        Err(_) => {
            info!(?timeout, "No broadcaster found");
            Ok(None)
        }
    }
}

/// The address other hosts most likely reach this one on.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick the
/// outgoing interface. Falls back to loopback when there is no route.
pub async fn local_ip() -> IpAddr {
    async fn routed_addr() -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
        socket.connect((Ipv4Addr::new(10, 254, 254, 254), 1)).await?;
        Ok(socket.local_addr()?.ip())
    }

    match routed_addr().await {
        Ok(ip) if !ip.is_unspecified() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}

// ── Tests ────────────────────────────────────────────────────────
