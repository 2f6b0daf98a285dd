use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Characters per "word" in the usual WPM convention.
const CHARS_PER_WORD: f64 = 5.0;

/// Sliding-window typing speed estimate.
#[derive(Debug, Clone)]
pub struct WpmMeter {
    window: Duration,
    presses: VecDeque<Instant>,
}

impl Default for WpmMeter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl WpmMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            presses: VecDeque::new(),
        }
    }

    pub fn record(&mut self, t: Instant) {
        self.presses.push_back(t);
        self.evict(t);
    }

    pub fn wpm(&mut self, now: Instant) -> f64 {
        self.evict(now);
        let per_window = self.presses.len() as f64 / CHARS_PER_WORD;
        per_window * (60.0 / self.window.as_secs_f64())
    }

    pub fn is_active(&mut self, now: Instant) -> bool {
        self.evict(now);
        !self.presses.is_empty()
    }

    pub fn clear(&mut self) {
        self.presses.clear();
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&front) = self.presses.front() {
            if now.saturating_duration_since(front) >= self.window {
                self.presses.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wpm_estimate() {
        let t0 = Instant::now();
        let mut meter = WpmMeter::new(Duration::from_secs(10));
        // 50 presses in 10s = 10 words per 10s = 60 WPM
        for i in 0..50 {
            meter.record(t0 + Duration::from_millis(i * 190));
        }
        let wpm = meter.wpm(t0 + Duration::from_millis(9_500));
        assert!((wpm - 60.0).abs() < f64::EPSILON, "wpm = {}", wpm);
    }

    #[test]
    fn test_old_presses_expire() {
        let t0 = Instant::now();
        let mut meter = WpmMeter::new(Duration::from_secs(2));
        meter.record(t0);
        assert!(meter.is_active(t0 + Duration::from_millis(1_999)));
        assert!(!meter.is_active(t0 + Duration::from_secs(2)));
        assert_eq!(meter.wpm(t0 + Duration::from_secs(3)), 0.0);
    }
}
