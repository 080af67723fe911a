//! Headless display: logs a one-line summary per stream, throttled.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::info;

use camcast_core::{DecodedFrame, FrameSink, StreamId, format_rate};

#[derive(Debug)]
struct StreamView {
    last_frame: Instant,
    new_frames: u64,
    last_summary: Option<Instant>,
}

/// [`FrameSink`] that reports each stream's size, new-frame count and rate.
///
/// The aggregation loop hands over the latest frame on every tick, so a
/// frame is only counted once its timestamp changes.
#[derive(Debug)]
pub struct LogSink {
    every: Duration,
    streams: HashMap<StreamId, StreamView>,
}

impl LogSink {
    pub fn new(every: Duration) -> Self {
        Self {
            every,
            streams: HashMap::new(),
        }
    }

    /// Distinct frames seen on `id` so far.
    pub fn frames_seen(&self, id: StreamId) -> u64 {
        self.streams.get(&id).map_or(0, |v| v.new_frames)
    }

    fn summary(id: StreamId, frame: &DecodedFrame, frames: u64, rate: Option<f64>) -> String {
        let mut line = format!(
            "{id}: {}x{} {} | {frames} frames",
            frame.width(),
            frame.height(),
            frame.format()
        );
        if let Some(rate) = rate {
            line.push_str(" | ");
            line.push_str(&format_rate(rate));
        }
        line
    }
}

impl FrameSink for LogSink {
    fn consume(&mut self, id: StreamId, frame: &DecodedFrame, rate: Option<f64>) {
        let now = Instant::now();
        let view = self.streams.entry(id).or_insert_with(|| StreamView {
            last_frame: frame.timestamp(),
            new_frames: 1,
            last_summary: None,
        });
        if frame.timestamp() != view.last_frame {
            view.last_frame = frame.timestamp();
            view.new_frames += 1;
        }

        let due = view
            .last_summary
            .is_none_or(|at| now.duration_since(at) >= self.every);
        if due {
            view.last_summary = Some(now);
            info!(stream = %id, "{}", Self::summary(id, frame, view.new_frames, rate));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcast_core::PixelFormat;

    fn frame() -> DecodedFrame {
        DecodedFrame::new(4, 2, PixelFormat::Rgb8, vec![0; 24]).unwrap()
    }

    #[test]
    fn repeated_frame_is_counted_once() {
        let id = StreamId::from_port(5555);
        let mut sink = LogSink::new(Duration::from_secs(1));
        let f = frame();
        sink.consume(id, &f, None);
        sink.consume(id, &f, None);
        assert_eq!(sink.frames_seen(id), 1);

        std::thread::sleep(Duration::from_millis(1));
        sink.consume(id, &frame(), Some(10.0));
        assert_eq!(sink.frames_seen(id), 2);
        assert_eq!(sink.frames_seen(StreamId::from_port(5556)), 0);
    }

    #[test]
    fn summary_line_includes_rate_when_given() {
        let id = StreamId::from_port(5555);
        let line = LogSink::summary(id, &frame(), 3, Some(2048.0));
        assert_eq!(line, "Stream-5555: 4x2 rgb8 | 3 frames | 2.0 KB/s");
        let line = LogSink::summary(id, &frame(), 3, None);
        assert!(!line.contains("/s"));
    }
}
