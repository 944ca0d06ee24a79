// Frame timing shown in the window title

use std::time::{Duration, Instant};

const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsSample {
    pub fps: f32,
    pub frame_time_ms: f32,
}

#[derive(Debug)]
pub struct FrameStats {
    frame_count: u32,
    last_sample: Instant,
    last_frame: Instant,
}

impl FrameStats {
    pub fn new(now: Instant) -> Self {
        Self {
            frame_count: 0,
            last_sample: now,
            last_frame: now,
        }
    }

    /// Count a presented frame; yields a sample about once per second
    pub fn tick(&mut self, now: Instant) -> Option<FpsSample> {
        let frame_time = now.duration_since(self.last_frame);
        self.last_frame = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_sample);
        if elapsed < SAMPLE_INTERVAL {
            return None;
        }

        let sample = FpsSample {
            fps: self.frame_count as f32 / elapsed.as_secs_f32(),
            frame_time_ms: frame_time.as_secs_f32() * 1000.0,
        };
        self.frame_count = 0;
        self.last_sample = now;
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_sample_before_a_second() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);
        for i in 1..10 {
            assert!(stats.tick(start + Duration::from_millis(i * 100)).is_none());
        }
    }

    #[test]
    fn averages_over_the_interval() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);
        let mut sample = None;
        for i in 1..=60u64 {
            sample = stats.tick(start + Duration::from_micros(i * 1_000_000 / 60));
        }

        let sample = sample.expect("sample after one second");
        assert!((sample.fps - 60.0).abs() < 0.5, "fps {}", sample.fps);
        assert!((sample.frame_time_ms - 16.67).abs() < 0.1);
    }

    #[test]
    fn counter_restarts_after_sample() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);
        assert!(stats.tick(start + Duration::from_secs(1)).is_some());
        assert!(stats.tick(start + Duration::from_millis(1500)).is_none());

        let sample = stats.tick(start + Duration::from_secs(2)).unwrap();
        assert!((sample.fps - 2.0).abs() < 1e-3);
    }
}
