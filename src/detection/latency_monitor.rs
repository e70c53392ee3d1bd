/// Rolling latency statistics for detector invocations
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use crate::utils::percentile;

/// Point-in-time view of the latency window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySnapshot {
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    /// Lifetime number of recorded samples, including evicted ones
    pub count: u64,
    /// Samples currently in the window
    pub window_len: usize,
}

impl LatencySnapshot {
    fn empty(count: u64) -> Self {
        Self {
            mean_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
            p50_ms: 0.0,
            p95_ms: 0.0,
            count,
            window_len: 0,
        }
    }
}

struct LatencyWindow {
    samples: VecDeque<f64>,
    capacity: usize,
    total: u64,
}

pub struct LatencyMonitor {
    window: Mutex<LatencyWindow>,
}

impl LatencyMonitor {
    /// Keep the most recent `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: Mutex::new(LatencyWindow {
                samples: VecDeque::with_capacity(capacity),
                capacity,
                total: 0,
            }),
        }
    }

    pub fn record(&self, duration_ms: f64) {
        let mut window = self.window.lock();
        if window.samples.len() == window.capacity {
            window.samples.pop_front();
        }
        window.samples.push_back(duration_ms);
        window.total += 1;
    }

    pub fn record_duration(&self, duration: Duration) {
        self.record(duration.as_secs_f64() * 1000.0);
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let (mut values, total) = {
            let window = self.window.lock();
            (window.samples.iter().copied().collect::<Vec<f64>>(), window.total)
        };

        if values.is_empty() {
            return LatencySnapshot::empty(total);
        }

        values.sort_by(f64::total_cmp);
        let mean = values.iter().sum::<f64>() / values.len() as f64;

        LatencySnapshot {
            mean_ms: mean,
            min_ms: values[0],
            max_ms: values[values.len() - 1],
            p50_ms: percentile(&values, 50.0),
            p95_ms: percentile(&values, 95.0),
            count: total,
            window_len: values.len(),
        }
    }

    /// Forget all samples and the lifetime count
    pub fn reset(&self) {
        let mut window = self.window.lock();
        window.samples.clear();
        window.total = 0;
    }

    pub fn capacity(&self) -> usize {
        self.window.lock().capacity
    }
}

impl Default for LatencyMonitor {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_snapshot_is_zeroed() {
        let monitor = LatencyMonitor::default();
        let snapshot = monitor.snapshot();

        assert_eq!(snapshot, LatencySnapshot::empty(0));
        assert_eq!(monitor.capacity(), 100);
    }

    #[test]
    fn test_basic_statistics() {
        let monitor = LatencyMonitor::new(10);
        for ms in [10.0, 20.0, 30.0, 40.0] {
            monitor.record(ms);
        }

        let snapshot = monitor.snapshot();
        assert_relative_eq!(snapshot.mean_ms, 25.0);
        assert_relative_eq!(snapshot.min_ms, 10.0);
        assert_relative_eq!(snapshot.max_ms, 40.0);
        assert_eq!(snapshot.count, 4);
        assert_eq!(snapshot.window_len, 4);
    }

    #[test]
    fn test_window_evicts_oldest_but_count_is_lifetime() {
        let monitor = LatencyMonitor::new(3);
        for ms in [100.0, 1.0, 2.0, 3.0] {
            monitor.record(ms);
        }

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.count, 4);
        assert_eq!(snapshot.window_len, 3);
        assert_relative_eq!(snapshot.max_ms, 3.0);
        assert_relative_eq!(snapshot.mean_ms, 2.0);
    }

    #[test]
    fn test_percentiles_ignore_recording_order() {
        let monitor = LatencyMonitor::new(100);
        for ms in (1..=100).rev() {
            monitor.record(ms as f64);
        }

        let snapshot = monitor.snapshot();
        // Nearest rank over 100 samples: index round(0.5 * 99) = 50
        assert_relative_eq!(snapshot.p50_ms, 51.0);
        assert_relative_eq!(snapshot.p95_ms, 95.0);
        assert_relative_eq!(snapshot.min_ms, 1.0);
        assert_relative_eq!(snapshot.max_ms, 100.0);
    }

    #[rstest]
    #[case(1, 1)]
    #[case(0, 1)]
    #[case(7, 7)]
    fn test_window_capacity(#[case] requested: usize, #[case] expected: usize) {
        let monitor = LatencyMonitor::new(requested);
        for _ in 0..10 {
            monitor.record(2.0);
        }

        assert_eq!(monitor.capacity(), expected);
        assert_eq!(monitor.snapshot().window_len, expected);
    }

    #[test]
    fn test_record_duration_converts_to_ms() {
        let monitor = LatencyMonitor::new(4);
        monitor.record_duration(Duration::from_micros(1500));

        assert_relative_eq!(monitor.snapshot().mean_ms, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_reset() {
        let monitor = LatencyMonitor::new(4);
        monitor.record(5.0);
        monitor.reset();

        assert_eq!(monitor.snapshot(), LatencySnapshot::empty(0));
    }

    #[test]
    fn test_concurrent_recording() {
        let monitor = Arc::new(LatencyMonitor::new(50));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let monitor = Arc::clone(&monitor);
                thread::spawn(move || {
                    for _ in 0..250 {
                        monitor.record(1.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.count, 1000);
        assert_eq!(snapshot.window_len, 50);
        assert_relative_eq!(snapshot.mean_ms, 1.0);
    }
}
