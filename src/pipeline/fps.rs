//! Frame-rate meter over a sliding window of frame timestamps

use std::time::{Duration, Instant};

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

/// Keeps the last `window` frame times plus whole-run totals.
pub struct FpsMeter {
    /// Ring buffer of recent frame instants (oldest overwritten)
    window: HeapRb<Instant>,

    started: Instant,
    frames: u64,
}

impl FpsMeter {
    pub fn new(window: usize, started: Instant) -> Self {
        Self {
            window: HeapRb::new(window.max(2)),
            started,
            frames: 0,
        }
    }

    /// Record a processed frame.
    pub fn tick(&mut self, now: Instant) {
        self.window.push_overwrite(now);
        self.frames += 1;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Rate over the recent window. Zero until two frames are in.
    pub fn recent_fps(&self) -> f64 {
        if self.window.occupied_len() < 2 {
            return 0.0;
        }
        let mut times = self.window.iter();
        let (Some(first), Some(last)) = (times.next(), times.last()) else {
            return 0.0;
        };
        let span = last.saturating_duration_since(*first).as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }
        (self.window.occupied_len() - 1) as f64 / span
    }

    /// Rate since the meter was started.
    pub fn average_fps(&self, now: Instant) -> f64 {
        let secs = self.elapsed(now).as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.frames as f64 / secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn recent_rate_uses_window_only() {
        let t0 = Instant::now();
        let mut meter = FpsMeter::new(4, t0);
        assert_eq!(meter.recent_fps(), 0.0);

        // Ten slow frames, then four at 100 fps
        for i in 0..10 {
            meter.tick(t0 + Duration::from_millis(100 * i));
        }
        let fast = t0 + Duration::from_secs(1);
        for i in 0..4 {
            meter.tick(fast + Duration::from_millis(10 * i));
        }
        assert_relative_eq!(meter.recent_fps(), 100.0, epsilon = 1e-6);
        assert_eq!(meter.frames(), 14);
    }

    #[test]
    fn average_rate_covers_whole_run() {
        let t0 = Instant::now();
        let mut meter = FpsMeter::new(8, t0);
        for i in 1..=60 {
            meter.tick(t0 + Duration::from_millis(1000 * i / 60));
        }
        assert_relative_eq!(
            meter.average_fps(t0 + Duration::from_secs(2)),
            30.0,
            epsilon = 1e-9
        );
    }
}
