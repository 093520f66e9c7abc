//! Pipeline frame-rate tracking.

use std::collections::VecDeque;
use std::time::Duration;

/// Default number of samples in the rolling FPS window.
pub const FPS_AVG_LEN: usize = 200;

/// Rolling window of per-iteration frame rates.
///
/// Holds at most `capacity` samples; the oldest is evicted before a new one
/// is appended once the window is full.
#[derive(Debug, Clone)]
pub struct FrameRateTracker {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Default for FrameRateTracker {
    fn default() -> Self {
        Self::new(FPS_AVG_LEN)
    }
}

impl FrameRateTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record one iteration's wall-clock time as a rate sample.
    ///
    /// A zero-length iteration is ignored rather than recorded as infinite.
    pub fn record(&mut self, elapsed: Duration) -> Option<f64> {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        let rate = 1.0 / secs;
        self.push_rate(rate);
        Some(rate)
    }

    pub fn push_rate(&mut self, rate: f64) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(rate);
    }

    /// Arithmetic mean of the window, 0 when empty.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_average_is_zero() {
        assert_eq!(FrameRateTracker::default().average(), 0.0);
    }

    #[test]
    fn window_keeps_most_recent_samples() {
        let mut tracker = FrameRateTracker::new(FPS_AVG_LEN);
        for i in 0..(FPS_AVG_LEN + 5) {
            tracker.push_rate(i as f64);
        }
        assert_eq!(tracker.len(), FPS_AVG_LEN);
        let retained: Vec<f64> = tracker.samples().collect();
        assert_eq!(retained.first().copied(), Some(5.0));
        assert_eq!(retained.last().copied(), Some((FPS_AVG_LEN + 4) as f64));
        let expected = (5..FPS_AVG_LEN + 5).map(|i| i as f64).sum::<f64>() / FPS_AVG_LEN as f64;
        assert!((tracker.average() - expected).abs() < 1e-9);
    }

    #[test]
    fn records_rate_from_elapsed_time() {
        let mut tracker = FrameRateTracker::new(4);
        assert_eq!(tracker.record(Duration::from_millis(50)), Some(20.0));
        assert_eq!(tracker.record(Duration::ZERO), None);
        assert_eq!(tracker.len(), 1);
        assert!((tracker.average() - 20.0).abs() < 1e-9);
    }
}
