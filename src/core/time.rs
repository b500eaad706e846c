//! Frame timing and per-stage pipeline timings

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Wall-clock milliseconds spent in each pipeline stage for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StageSample {
    pub force_ms: f32,
    pub visibility_ms: f32,
    pub finalize_ms: f32,
}

impl StageSample {
    pub fn total_ms(&self) -> f32 {
        self.force_ms + self.visibility_ms + self.finalize_ms
    }
}

/// Rolling per-stage timings over the last N frames
#[derive(Debug, Clone)]
pub struct StageTimings {
    latest: StageSample,
    history: VecDeque<StageSample>,
    max_history: usize,
}

impl StageTimings {
    pub fn new(max_history: usize) -> Self {
        Self {
            latest: StageSample::default(),
            history: VecDeque::with_capacity(max_history),
            max_history: max_history.max(1),
        }
    }

    /// Push a frame's sample, evicting the oldest beyond the window
    pub fn record(&mut self, sample: StageSample) {
        self.latest = sample;
        self.history.push_back(sample);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    pub fn latest(&self) -> StageSample {
        self.latest
    }

    /// Average over the recorded window (zero when empty)
    pub fn average(&self) -> StageSample {
        if self.history.is_empty() {
            return StageSample::default();
        }
        let n = self.history.len() as f32;
        let sum = self.history.iter().fold(StageSample::default(), |acc, s| StageSample {
            force_ms: acc.force_ms + s.force_ms,
            visibility_ms: acc.visibility_ms + s.visibility_ms,
            finalize_ms: acc.finalize_ms + s.finalize_ms,
        });
        StageSample {
            force_ms: sum.force_ms / n,
            visibility_ms: sum.visibility_ms / n,
            finalize_ms: sum.finalize_ms / n,
        }
    }

    pub fn frames_recorded(&self) -> usize {
        self.history.len()
    }
}

impl Default for StageTimings {
    fn default() -> Self {
        Self::new(60)
    }
}

/// Run `f` and return its result with the elapsed time in milliseconds
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, f32) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed().as_secs_f32() * 1000.0)
}

/// Tracks frame timing for a host loop
pub struct FrameTimer {
    last_frame: Instant,
    delta: Duration,
    frame_count: u64,
}

impl FrameTimer {
    /// Create a new frame timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Call once per frame to update timing
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_frame;
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Get delta time in seconds
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Get total frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
