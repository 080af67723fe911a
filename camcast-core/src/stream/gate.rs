//! Connection gate: decides whether a stream ever came alive.
//!
//! A subscription is lazy, so "connected" here means "a producer actually
//! sent something". The gate keeps receiving with a short per-attempt
//! timeout until the first message arrives (→ `Connected`) or the deadline
//! passes (→ `Failed`). The first message is only a liveness signal and is
//! never decoded.
//!
//! ```text
//!  Connecting ──► Connected
//!       │
//!       └──────► Failed
//! ```

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::CastError;
use crate::transport::Channel;

/// Floor for a single receive attempt, so a zero deadline still polls once.
const MIN_ATTEMPT: Duration = Duration::from_millis(10);

// ── ConnectionState ──────────────────────────────────────────────

/// Connection phase of one stream. Both exits are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the first message.
    Connecting,
    /// A message arrived.
    Connected {
        /// When the first message arrived.
        since: Instant,
    },
    /// The deadline passed (or the transport broke) before any message.
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "Connecting",
            Self::Connected { .. } => "Connected",
            Self::Failed => "Failed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn connect(&mut self) -> Result<(), CastError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            other => Err(CastError::InvalidTransition {
                from: other.name(),
                to: "Connected",
            }),
        }
    }

    /// Transition to `Failed`.
    ///
    /// Valid from: `Connecting`.
    pub fn fail(&mut self) -> Result<(), CastError> {
        match self {
            Self::Connecting => {
                *self = Self::Failed;
                Ok(())
            }
            other => Err(CastError::InvalidTransition {
                from: other.name(),
                to: "Failed",
            }),
        }
    }
}

// ── ConnectionGate ───────────────────────────────────────────────

/// Bounded wait for a stream's first message.
#[derive(Debug)]
pub struct ConnectionGate {
    deadline: Duration,
    attempt_timeout: Duration,
    state: ConnectionState,
}

impl ConnectionGate {
    /// `deadline` bounds the whole wait; `attempt_timeout` bounds each
    /// receive and therefore how quickly cancellation is noticed.
    pub fn new(deadline: Duration, attempt_timeout: Duration) -> Self {
        Self {
            deadline,
            attempt_timeout,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Wait for the first message on `channel`.
    ///
    /// Returns how long it took to connect. Errors:
    /// - [`CastError::ConnectTimeout`]: deadline passed, state is `Failed`.
    /// - [`CastError::Cancelled`]: `cancel` fired, state stays `Connecting`.
    /// - any other transport error: state is `Failed`.
    pub async fn wait(
        &mut self,
        channel: &mut dyn Channel,
        cancel: &CancellationToken,
    ) -> Result<Duration, CastError> {
        if self.state != ConnectionState::Connecting {
            return Err(CastError::InvalidTransition {
                from: self.state.name(),
                to: "Connecting",
            });
        }

        let started = Instant::now();
        loop {
            let remaining = self.deadline.saturating_sub(started.elapsed());
            let attempt = self.attempt_timeout.min(remaining).max(MIN_ATTEMPT);

            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CastError::Cancelled),
                received = channel.recv(attempt) => received,
            };

            match received {
                Ok(_first) => {
                    self.state.connect()?;
                    return Ok(started.elapsed());
                }
                Err(e) if e.is_timeout() => {
                    if started.elapsed() >= self.deadline {
                        self.state.fail()?;
                        return Err(CastError::ConnectTimeout(self.deadline));
                    }
                    trace!("still waiting for first message");
                }
                Err(e) => {
                    self.state.fail()?;
                    return Err(e);
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryChannel;

    const ATTEMPT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn first_message_connects() {
        let (tx, mut channel) = MemoryChannel::pair(true);
        tx.send(&b"hello"[..]).unwrap();

        let mut gate = ConnectionGate::new(Duration::from_secs(1), ATTEMPT);
        let cancel = CancellationToken::new();
        let took = gate.wait(&mut channel, &cancel).await.unwrap();

        assert!(gate.state().is_connected());
        assert!(took < Duration::from_millis(500));
        // The liveness message was consumed, not left for the decoder.
        assert!(channel.recv(ATTEMPT).await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn late_message_within_deadline_connects() {
        let (tx, mut channel) = MemoryChannel::pair(true);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(&b"late"[..]);
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let mut gate = ConnectionGate::new(Duration::from_millis(500), ATTEMPT);
        let took = gate.wait(&mut channel, &CancellationToken::new()).await.unwrap();
        assert!(took >= Duration::from_millis(90));
        assert!(gate.state().is_connected());
    }

    #[tokio::test]
    async fn silence_fails_after_deadline() {
        let (_tx, mut channel) = MemoryChannel::pair(true);
        let mut gate = ConnectionGate::new(Duration::from_millis(100), ATTEMPT);

        let started = Instant::now();
        let err = gate.wait(&mut channel, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, CastError::ConnectTimeout(d) if d == Duration::from_millis(100)));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(gate.state().is_failed());
    }

    #[tokio::test]
    async fn zero_deadline_still_tries_once() {
        let (tx, mut channel) = MemoryChannel::pair(true);
        tx.send(&b"ready"[..]).unwrap();
        let mut gate = ConnectionGate::new(Duration::ZERO, ATTEMPT);
        assert!(gate.wait(&mut channel, &CancellationToken::new()).await.is_ok());

        let (_tx, mut channel) = MemoryChannel::pair(true);
        let mut gate = ConnectionGate::new(Duration::ZERO, ATTEMPT);
        let err = gate.wait(&mut channel, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CastError::ConnectTimeout(_)));
    }

    #[tokio::test]
    async fn cancellation_is_observed_promptly() {
        let (_tx, mut channel) = MemoryChannel::pair(true);
        let mut gate = ConnectionGate::new(Duration::from_secs(30), ATTEMPT);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = gate.wait(&mut channel, &cancel).await.unwrap_err();
        assert!(matches!(err, CastError::Cancelled));
        assert!(started.elapsed() < Duration::from_millis(50) + ATTEMPT * 5);
        assert_eq!(gate.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn transport_fault_fails_the_gate() {
        let (tx, mut channel) = MemoryChannel::pair(true);
        drop(tx);
        let mut gate = ConnectionGate::new(Duration::from_secs(5), ATTEMPT);
        let err = gate.wait(&mut channel, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CastError::ChannelClosed));
        assert!(gate.state().is_failed());
    }

    #[tokio::test]
    async fn gate_is_single_use() {
        let (tx, mut channel) = MemoryChannel::pair(true);
        tx.send(&b"x"[..]).unwrap();
        let mut gate = ConnectionGate::new(Duration::from_secs(1), ATTEMPT);
        let cancel = CancellationToken::new();
        gate.wait(&mut channel, &cancel).await.unwrap();
        assert!(matches!(
            gate.wait(&mut channel, &cancel).await,
            Err(CastError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn transitions_are_terminal() {
        let mut state = ConnectionState::Connecting;
        state.connect().unwrap();
        assert!(state.fail().is_err());
        assert!(state.connect().is_err());

        let mut state = ConnectionState::Connecting;
        state.fail().unwrap();
        assert!(state.connect().is_err());
        assert_eq!(state.to_string(), "Failed");
    }
}
