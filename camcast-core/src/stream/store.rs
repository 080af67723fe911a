//! Latest-frame cache shared between stream supervisors and the display loop.
//!
//! Every access goes through one short critical section. Nothing is
//! decoded, awaited or rendered while a lock is held; readers get cheap
//! copies (frames share their pixel storage) and release the lock before
//! doing anything with them.
//!
//! Lock order is always `entries` then `rates`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::StreamId;
use super::rate::RateEstimator;
use crate::frame::DecodedFrame;

// ── StreamEntry ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct StreamEntry {
    latest_frame: Option<DecodedFrame>,
    cumulative_bytes: u64,
    frames: u64,
}

/// Copy of one stream's entry, detached from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSnapshot {
    /// Most recently decoded frame, `None` until the first one lands.
    pub frame: Option<DecodedFrame>,
    /// Payload bytes of every stored frame since activation.
    pub cumulative_bytes: u64,
    /// Number of frames stored since activation.
    pub frames: u64,
}

// ── FrameStore ───────────────────────────────────────────────────

/// Map from stream to its most recent decoded frame and byte counter.
///
/// Entries are created by [`activate`](Self::activate) once a stream has
/// connected and deleted by [`remove`](Self::remove) when its supervisor
/// exits. [`put`](Self::put) never creates an entry, so a write racing a
/// removal cannot resurrect the stream.
#[derive(Debug, Default)]
pub struct FrameStore {
    entries: Mutex<HashMap<StreamId, StreamEntry>>,
    rates: Mutex<RateEstimator>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty entry for a freshly connected stream.
    ///
    /// Returns `false` if the stream already had one (left untouched).
    pub fn activate(&self, id: StreamId) -> bool {
        let mut entries = self.entries();
        if entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, StreamEntry::default());
        true
    }

    /// Replace the stream's frame and add `byte_delta` to its counter.
    ///
    /// Returns `false` (and stores nothing) if the stream is not active.
    pub fn put(&self, id: StreamId, frame: DecodedFrame, byte_delta: u64) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(&id) else {
            return false;
        };
        entry.latest_frame = Some(frame);
        entry.cumulative_bytes = entry.cumulative_bytes.saturating_add(byte_delta);
        entry.frames += 1;
        true
    }

    /// Copy out one stream's current state.
    pub fn get(&self, id: StreamId) -> Option<StreamSnapshot> {
        let entries = self.entries();
        entries.get(&id).map(|entry| StreamSnapshot {
            frame: entry.latest_frame.clone(),
            cumulative_bytes: entry.cumulative_bytes,
            frames: entry.frames,
        })
    }

    /// Currently live streams, in ascending order.
    pub fn snapshot_keys(&self) -> Vec<StreamId> {
        let mut keys: Vec<StreamId> = self.entries().keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.entries().contains_key(&id)
    }

    /// Delete the stream's entry together with its rate state.
    ///
    /// Returns whether an entry existed.
    pub fn remove(&self, id: StreamId) -> bool {
        let mut entries = self.entries();
        let existed = entries.remove(&id).is_some();
        self.rates().forget(id);
        existed
    }

    /// Feed `cumulative_bytes` to the stream's rate estimator.
    ///
    /// Returns `None` if the stream is no longer active, so a reader racing
    /// a removal cannot leave rate state behind.
    pub fn sample_rate(&self, id: StreamId, cumulative_bytes: u64) -> Option<f64> {
        let entries = self.entries();
        if !entries.contains_key(&id) {
            return None;
        }
        Some(self.rates().sample(id, cumulative_bytes))
    }

    /// Number of live streams.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Number of streams with rate state (always ≤ [`len`](Self::len)).
    pub fn tracked_rates(&self) -> usize {
        let _entries = self.entries();
        self.rates().len()
    }

    // ── Internal ─────────────────────────────────────────────────

    // A panic while holding the lock cannot leave an entry half-written
    // (frames are replaced whole), so poisoning is ignored.
    fn entries(&self) -> MutexGuard<'_, HashMap<StreamId, StreamEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rates(&self) -> MutexGuard<'_, RateEstimator> {
        self.rates.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ────────────────────────────────────────────────────────
