use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub frame_time_ms: f32,
    pub worst_frame_time_ms: f32,
    /// Frames in the interval that took longer than the render target.
    pub late_frames: u32,
}

/// Most recent interval's numbers, shared with whoever wants to display them.
#[derive(Clone, Debug, Default)]
pub struct MetricsHandle {
    latest: Arc<Mutex<LoopMetricsSnapshot>>,
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

/// Collects presented frame durations and closes an interval once it is
/// at least `interval` long.
#[derive(Debug)]
pub(crate) struct FrameStats {
    interval: Duration,
    late_after: Option<Duration>,
    started: Instant,
    frames: u32,
    late: u32,
    total: Duration,
    worst: Duration,
}

impl FrameStats {
    pub(crate) fn new(interval: Duration, late_after: Option<Duration>, started: Instant) -> Self {
        Self {
            interval,
            late_after,
            started,
            frames: 0,
            late: 0,
            total: Duration::ZERO,
            worst: Duration::ZERO,
        }
    }

    pub(crate) fn record(&mut self, frame_dt: Duration) {
        self.frames = self.frames.saturating_add(1);
        self.total = self.total.saturating_add(frame_dt);
        self.worst = self.worst.max(frame_dt);
        if self.late_after.is_some_and(|limit| frame_dt > limit) {
            self.late = self.late.saturating_add(1);
        }
    }

    pub(crate) fn roll(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed < self.interval {
            return None;
        }

        let mean_ms = match self.frames {
            0 => 0.0,
            frames => self.total.as_secs_f32() * 1000.0 / frames as f32,
        };
        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / elapsed.as_secs_f32().max(f32::EPSILON),
            frame_time_ms: mean_ms,
            worst_frame_time_ms: self.worst.as_secs_f32() * 1000.0,
            late_frames: self.late,
        };
        *self = Self::new(self.interval, self.late_after, now);
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn interval_reports_mean_worst_and_late() {
        let start = Instant::now();
        let mut stats = FrameStats::new(
            Duration::from_secs(1),
            Some(Duration::from_millis(20)),
            start,
        );
        stats.record(Duration::from_millis(16));
        stats.record(Duration::from_millis(16));
        stats.record(Duration::from_millis(40));

        let snapshot = stats
            .roll(start + Duration::from_secs(1))
            .expect("interval closed");
        assert!((snapshot.fps - 3.0).abs() < 0.05);
        assert!((snapshot.frame_time_ms - 24.0).abs() < 0.001);
        assert!((snapshot.worst_frame_time_ms - 40.0).abs() < 0.001);
        assert_eq!(snapshot.late_frames, 1);
    }

    #[test]
    fn nothing_is_reported_mid_interval() {
        let start = Instant::now();
        let mut stats = FrameStats::new(Duration::from_secs(1), None, start);
        stats.record(Duration::from_millis(16));
        assert!(stats.roll(start + Duration::from_millis(500)).is_none());
    }

    #[test]
    fn rolling_starts_a_fresh_interval() {
        let start = Instant::now();
        let mut stats = FrameStats::new(Duration::from_secs(1), None, start);
        stats.record(Duration::from_millis(90));
        stats.roll(start + Duration::from_secs(1)).expect("first");

        let second = stats.roll(start + Duration::from_secs(2)).expect("second");
        assert_eq!(second, LoopMetricsSnapshot::default());
    }

    #[test]
    fn handle_survives_a_poisoned_lock() {
        let handle = MetricsHandle::default();
        let poisoner = handle.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.latest.lock().expect("lock");
            panic!("poison the metrics lock");
        })
        .join();

        let expected = LoopMetricsSnapshot {
            fps: 30.0,
            frame_time_ms: 33.0,
            worst_frame_time_ms: 50.0,
            late_frames: 2,
        };
        handle.publish(expected);
        assert_eq!(handle.snapshot(), expected);
    }
}
