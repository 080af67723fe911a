//! Per-stream throughput estimator.
//!
//! Derives bytes/second from a stream's cumulative byte counter. Sampling is
//! throttled: a new rate is only computed once at least
//! [`SAMPLE_INTERVAL`] has passed since the previous sample, otherwise the
//! last computed rate is returned unchanged. Sub-second estimates are too
//! noisy to be worth showing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::StreamId;

/// Minimum spacing between two rate computations for one stream.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Floor applied to the elapsed time before dividing.
const MIN_ELAPSED_SECS: f64 = 1e-6;

/// Last sample taken for one stream.
#[derive(Debug, Clone, Copy)]
struct RateSample {
    previous_bytes: u64,
    previous_at: Instant,
    rate: f64,
}

/// Throttled bytes/second estimator, one independent state per stream.
#[derive(Debug, Default)]
pub struct RateEstimator {
    samples: HashMap<StreamId, RateSample>,
}

impl RateEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current cumulative byte count for `id`.
    pub fn sample(&mut self, id: StreamId, cumulative_bytes: u64) -> f64 {
        self.sample_at(id, cumulative_bytes, Instant::now())
    }

    /// Same as [`sample`](Self::sample) with an explicit clock (for tests).
    ///
    /// The first sample of a stream seeds its state and reports `0.0`.
    pub fn sample_at(&mut self, id: StreamId, cumulative_bytes: u64, now: Instant) -> f64 {
        let Some(state) = self.samples.get_mut(&id) else {
            self.samples.insert(
                id,
                RateSample {
                    previous_bytes: cumulative_bytes,
                    previous_at: now,
                    rate: 0.0,
                },
            );
            return 0.0;
        };

        let elapsed = now.saturating_duration_since(state.previous_at);
        if elapsed < SAMPLE_INTERVAL {
            return state.rate;
        }

        let secs = elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);
        let delta = cumulative_bytes.saturating_sub(state.previous_bytes);
        state.rate = delta as f64 / secs;
        state.previous_bytes = cumulative_bytes;
        state.previous_at = now;
        state.rate
    }

    /// Most recently computed rate, if the stream has been sampled.
    pub fn current(&self, id: StreamId) -> Option<f64> {
        self.samples.get(&id).map(|s| s.rate)
    }

    /// Drop all state for `id`.
    pub fn forget(&mut self, id: StreamId) {
        self.samples.remove(&id);
    }

    /// Number of streams with live rate state.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Render a byte rate as short human text, e.g. `12.3 KB/s`.
pub fn format_rate(bytes_per_sec: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    if bytes_per_sec >= MB {
        format!("{:.2} MB/s", bytes_per_sec / MB)
    } else if bytes_per_sec >= KB {
        format!("{:.1} KB/s", bytes_per_sec / KB)
    } else {
        format!("{bytes_per_sec:.0} B/s")
    }
}

// ── Tests ────────────────────────────────────────────────────────
