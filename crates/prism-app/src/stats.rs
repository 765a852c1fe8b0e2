//! Frame timing statistics.

use std::time::{Duration, Instant};

/// Running min/max/average frame rate.
#[derive(Debug, Clone)]
pub struct FrameStats {
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
    samples: u64,
    last_frame: Instant,
}

impl FrameStats {
    pub fn new(now: Instant) -> Self {
        Self {
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
            samples: 0,
            last_frame: now,
        }
    }

    /// Record a frame ending at `now`. Returns the delta since the previous one.
    pub fn record(&mut self, now: Instant) -> Duration {
        let dt = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;

        let secs = dt.as_secs_f64();
        if secs > 0.0 {
            let fps = 1.0 / secs;
            self.min_fps = self.min_fps.min(fps);
            self.max_fps = self.max_fps.max(fps);
            self.fps_sum += fps;
            self.samples += 1;
        }
        dt
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// `(min, max, avg)`, or `None` before the first timed frame.
    pub fn summary(&self) -> Option<(f64, f64, f64)> {
        (self.samples > 0).then(|| {
            (
                self.min_fps,
                self.max_fps,
                self.fps_sum / self.samples as f64,
            )
        })
    }
}

/// Sleep-based pacing target.
pub fn frame_budget(target_fps: Option<u32>) -> Option<Duration> {
    target_fps
        .filter(|&fps| fps > 0)
        .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tracks_min_max_avg() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);
        assert!(stats.summary().is_none());

        stats.record(start + Duration::from_millis(10));
        stats.record(start + Duration::from_millis(30));

        let (min, max, avg) = stats.summary().unwrap();
        assert_relative_eq!(min, 50.0, epsilon = 1e-6);
        assert_relative_eq!(max, 100.0, epsilon = 1e-6);
        assert_relative_eq!(avg, 75.0, epsilon = 1e-6);
        assert_eq!(stats.samples(), 2);
    }

    #[test]
    fn zero_delta_is_not_sampled() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);
        assert_eq!(stats.record(start), Duration::ZERO);
        assert_eq!(stats.samples(), 0);
    }

    #[test]
    fn budget_from_target_fps() {
        assert_eq!(frame_budget(None), None);
        assert_eq!(frame_budget(Some(0)), None);
        assert_eq!(frame_budget(Some(50)), Some(Duration::from_millis(20)));
    }
}
