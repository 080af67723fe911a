//! # Multi-stream reception engine
//!
//! ```text
//!   Channel ──► ConnectionGate ──► decode (blocking pool) ──► FrameStore
//!      ▲        (first msg only)                                  │
//!      │                                                          ▼
//!   StreamSupervisor × N  (StreamPool)              AggregationLoop ──► FrameSink
//!                                                  (+ RateEstimator)
//! ```
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | `gate`       | First-message connection state machine               |
//! | `store`      | Shared latest-frame cache and byte counters          |
//! | `rate`       | Throttled per-stream bytes/second                    |
//! | `supervisor` | One stream's connect → receive → decode → teardown   |
//! | `pool`       | Spawns, cancels and joins supervisors                |
//! | `aggregate`  | Single consumer polling the store for display        |

pub mod aggregate;
pub mod gate;
pub mod pool;
pub mod rate;
pub mod store;
pub mod supervisor;

use std::fmt;

pub use aggregate::{AggregationLoop, AggregationStop, FrameSink, MAX_POLL_INTERVAL};
pub use gate::{ConnectionGate, ConnectionState};
pub use pool::{StreamEvent, StreamEventReceiver, StreamPool};
pub use rate::{RateEstimator, format_rate};
pub use store::{FrameStore, StreamSnapshot};
pub use supervisor::{StreamOutcome, StreamReport, StreamSupervisor, SupervisorConfig};

// ── StreamId ─────────────────────────────────────────────────────

/// Identifies one logical stream, usually by the port it is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u32);

impl StreamId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The conventional id for a stream published on `port`.
    pub const fn from_port(port: u16) -> Self {
        Self(port as u32)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_window_naming() {
        assert_eq!(StreamId::from_port(5555).to_string(), "Stream-5555");
        assert_eq!(StreamId::new(7).get(), 7);
    }
}
