use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling-window estimate of how long the remaining progress will take.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    interval: Duration,
    window: usize,
    samples: VecDeque<(Instant, f64)>,
}

impl ProgressTracker {
    pub fn new(interval: Duration, window: usize) -> Self {
        ProgressTracker {
            interval,
            window: window.max(2),
            samples: VecDeque::new(),
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Records a sample unless the previous one is younger than the interval.
    pub fn update(&mut self, progress: f64) {
        self.update_at(progress, Instant::now());
    }

    pub(crate) fn update_at(&mut self, progress: f64, now: Instant) {
        if let Some(&(at, last)) = self.samples.back() {
            if now.duration_since(at) < self.interval {
                return;
            }
            if progress < last {
                // the task went backwards; old samples no longer apply
                self.samples.clear();
            }
        }
        self.samples.push_back((now, progress));
        while self.samples.len() > self.window {
            self.samples.pop_front();
        }
    }

    /// Average time per unit of progress over the window.
    pub fn time_per_unit(&self) -> Option<Duration> {
        let (&(first_at, first), &(last_at, last)) =
            (self.samples.front()?, self.samples.back()?);
        let delta = last - first;
        if delta <= 0.0 {
            return None;
        }
        Some(last_at.duration_since(first_at).div_f64(delta))
    }

    pub fn estimate_remaining(&self, progress: f64) -> Option<Duration> {
        let per_unit = self.time_per_unit()?;
        Some(per_unit.mul_f64((1.0 - progress).clamp(0.0, 1.0)))
    }
}
