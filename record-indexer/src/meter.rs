//! Throughput measurement for progress reporting.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Moving records-per-second meter over a sliding window.
///
/// Progress logging only; no correctness role.
#[derive(Debug)]
pub struct PerformanceMeter {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
    total: u64,
}

impl PerformanceMeter {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
            total: 0,
        }
    }

    /// Record `count` processed records at the current instant.
    pub fn add(&mut self, count: u64) {
        self.total += count;
        let now = Instant::now();
        self.samples.push_back((now, count));
        self.evict(now);
    }

    /// Recent throughput in records per second.
    pub fn speed(&mut self) -> f64 {
        let now = Instant::now();
        self.evict(now);
        let in_window: u64 = self.samples.iter().map(|(_, count)| count).sum();
        if in_window == 0 {
            return 0.0;
        }
        let oldest = match self.samples.front() {
            Some((instant, _)) => *instant,
            None => return 0.0,
        };
        let elapsed = now.duration_since(oldest).as_secs_f64();
        if elapsed > 0.0 {
            in_window as f64 / elapsed
        } else {
            in_window as f64
        }
    }

    /// Total records seen over the meter's lifetime.
    pub fn total(&self) -> u64 {
        self.total
    }

    fn evict(&mut self, now: Instant) {
        while let Some((instant, _)) = self.samples.front() {
            if now.duration_since(*instant) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for PerformanceMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_accumulates() {
        let mut meter = PerformanceMeter::new();
        meter.add(10);
        meter.add(5);
        assert_eq!(meter.total(), 15);
    }

    #[test]
    fn test_speed_is_positive_after_samples() {
        let mut meter = PerformanceMeter::new();
        meter.add(100);
        assert!(meter.speed() > 0.0);
    }

    #[test]
    fn test_speed_without_samples_is_zero() {
        let mut meter = PerformanceMeter::new();
        assert_eq!(meter.speed(), 0.0);
    }

    #[test]
    fn test_old_samples_are_evicted() {
        let mut meter = PerformanceMeter::with_window(Duration::from_millis(0));
        meter.add(100);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(meter.speed(), 0.0);
        assert_eq!(meter.total(), 100);
    }
}
