//! Download ETA from a short window of progress samples.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Samples kept per job
const WINDOW: usize = 5;

/// Sliding window of `(progress, instant)` samples for one job.
#[derive(Debug, Clone, Default)]
pub struct EtaTracker {
    samples: VecDeque<(u8, Instant)>,
}

impl EtaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample. Repeated values and zero progress are ignored.
    pub fn record(&mut self, progress: u8, at: Instant) {
        if progress == 0 || self.samples.back().is_some_and(|&(p, _)| p == progress) {
            return;
        }
        if self.samples.len() == WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back((progress, at));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Remaining time at the window's average rate.
    ///
    /// `None` until two samples exist and progress is moving forward.
    pub fn estimate(&self) -> Option<Duration> {
        let (&(first, t_first), &(last, t_last)) = (self.samples.front()?, self.samples.back()?);
        let elapsed = t_last.checked_duration_since(t_first)?.as_secs_f64();
        if self.samples.len() < 2 || elapsed <= 0.0 || last <= first {
            return None;
        }

        let rate = f64::from(last - first) / elapsed;
        let remaining = f64::from(100u8.saturating_sub(last)) / rate;
        Some(Duration::from_secs_f64(remaining))
    }
}

/// Render an ETA as `"42s"`, `"3m 5s"` or `"1h 2m"`.
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs_f64().round() as u64;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_two_samples() {
        let start = Instant::now();
        let mut eta = EtaTracker::new();
        assert_eq!(eta.estimate(), None);

        eta.record(10, start);
        assert_eq!(eta.estimate(), None);

        eta.record(20, start + Duration::from_secs(2));
        // 5%/s, 80% left
        assert_eq!(eta.estimate(), Some(Duration::from_secs(16)));
    }

    #[test]
    fn test_ten_to_twenty_percent_in_five_seconds() {
        let start = Instant::now();
        let mut eta = EtaTracker::new();
        eta.record(10, start);
        eta.record(20, start + Duration::from_secs(5));
        // 2%/s, 80% left
        assert_eq!(eta.estimate(), Some(Duration::from_secs(40)));
        assert_eq!(format_eta(Duration::from_secs(40)), "40s");
    }

    #[test]
    fn test_repeats_and_zero_are_ignored() {
        let start = Instant::now();
        let mut eta = EtaTracker::new();
        eta.record(0, start);
        eta.record(10, start);
        eta.record(10, start + Duration::from_secs(1));
        assert_eq!(eta.len(), 1);
    }

    #[test]
    fn test_window_is_bounded() {
        let start = Instant::now();
        let mut eta = EtaTracker::new();
        for i in 1..=8u8 {
            eta.record(i * 10, start + Duration::from_secs(u64::from(i)));
        }
        assert_eq!(eta.len(), 5);
        // Window spans 40..=80 over 4s: 10%/s, 20% left
        assert_eq!(eta.estimate(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(Duration::from_secs(42)), "42s");
        assert_eq!(format_eta(Duration::from_secs(185)), "3m 5s");
        assert_eq!(format_eta(Duration::from_secs(3720)), "1h 2m");
        assert_eq!(format_eta(Duration::from_millis(400)), "0s");
    }
}
