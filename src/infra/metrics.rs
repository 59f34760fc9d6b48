//! Lock-free pass metrics and periodic reporting
//!
//! Uses atomics so the control loop and the reporter task never contend.
//! Monotonic counters are never reset; elapsed-time buckets are swapped to
//! zero on each report. Only one task should call `report`; other readers
//! take a `snapshot`, which leaves the buckets alone.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use crate::domain::types::SpeedBand;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// Elapsed-time bucket boundaries (milliseconds)
/// Buckets: ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, ≤5120, >5120
const ELAPSED_BOUNDS_MS: [u64; 10] = [10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120];
pub const NUM_BUCKETS: usize = 11;

/// Compute bucket index for an elapsed time using binary search
#[inline]
fn bucket_index(elapsed_ms: u64) -> usize {
    ELAPSED_BOUNDS_MS.partition_point(|&bound| bound < elapsed_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Finished passes (measured + noise)
    passes_total: AtomicU64,
    measured_total: AtomicU64,
    noise_total: AtomicU64,
    too_slow_total: AtomicU64,
    normal_total: AtomicU64,
    too_fast_total: AtomicU64,
    alerts_total: AtomicU64,
    /// Highest measured speed in hundredths of km/h (monotonic max)
    max_speed_centi_kmh: AtomicU64,
    /// Elapsed time of the most recent finished pass (µs)
    last_elapsed_us: AtomicU64,
    /// Elapsed-time histogram of measured passes (reset on report)
    elapsed_buckets: [AtomicU64; NUM_BUCKETS],
    /// Egress messages dropped because the channel was full
    egress_dropped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            passes_total: AtomicU64::new(0),
            measured_total: AtomicU64::new(0),
            noise_total: AtomicU64::new(0),
            too_slow_total: AtomicU64::new(0),
            normal_total: AtomicU64::new(0),
            too_fast_total: AtomicU64::new(0),
            alerts_total: AtomicU64::new(0),
            max_speed_centi_kmh: AtomicU64::new(0),
            last_elapsed_us: AtomicU64::new(0),
            elapsed_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            egress_dropped: AtomicU64::new(0),
        }
    }

    /// Record a measured pass
    #[inline]
    pub fn record_measured(&self, elapsed: Duration, speed_kmh: f64, band: SpeedBand) {
        self.passes_total.fetch_add(1, Ordering::Relaxed);
        self.measured_total.fetch_add(1, Ordering::Relaxed);
        self.last_elapsed_us.store(elapsed.as_micros() as u64, Ordering::Relaxed);

        let bucket = bucket_index(elapsed.as_millis() as u64);
        self.elapsed_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        let band_counter = match band {
            SpeedBand::TooSlow => &self.too_slow_total,
            SpeedBand::Normal => &self.normal_total,
            SpeedBand::TooFast => &self.too_fast_total,
        };
        band_counter.fetch_add(1, Ordering::Relaxed);

        // f64 -> u64 casts saturate, so absurd speeds clamp instead of wrapping
        update_atomic_max(&self.max_speed_centi_kmh, (speed_kmh * 100.0).round() as u64);
    }

    /// Record a pass rejected as noise
    #[inline]
    pub fn record_noise(&self, elapsed: Duration) {
        self.passes_total.fetch_add(1, Ordering::Relaxed);
        self.noise_total.fetch_add(1, Ordering::Relaxed);
        self.last_elapsed_us.store(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert(&self) {
        self.alerts_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_egress_dropped(&self) {
        self.egress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn passes_total(&self) -> u64 {
        self.passes_total.load(Ordering::Relaxed)
    }

    pub fn measured_total(&self) -> u64 {
        self.measured_total.load(Ordering::Relaxed)
    }

    pub fn noise_total(&self) -> u64 {
        self.noise_total.load(Ordering::Relaxed)
    }

    pub fn alerts_total(&self) -> u64 {
        self.alerts_total.load(Ordering::Relaxed)
    }

    /// Snapshot counters, resetting the elapsed-time histogram
    pub fn report(&self) -> MetricsSummary {
        self.summary(swap_buckets(&self.elapsed_buckets))
    }

    /// Snapshot counters without touching the histogram
    pub fn snapshot(&self) -> MetricsSummary {
        self.summary(load_buckets(&self.elapsed_buckets))
    }

    fn summary(&self, elapsed_buckets: [u64; NUM_BUCKETS]) -> MetricsSummary {
        MetricsSummary {
            passes_total: self.passes_total.load(Ordering::Relaxed),
            measured_total: self.measured_total.load(Ordering::Relaxed),
            noise_total: self.noise_total.load(Ordering::Relaxed),
            too_slow_total: self.too_slow_total.load(Ordering::Relaxed),
            normal_total: self.normal_total.load(Ordering::Relaxed),
            too_fast_total: self.too_fast_total.load(Ordering::Relaxed),
            alerts_total: self.alerts_total.load(Ordering::Relaxed),
            max_speed_kmh: self.max_speed_centi_kmh.load(Ordering::Relaxed) as f64 / 100.0,
            last_elapsed_us: self.last_elapsed_us.load(Ordering::Relaxed),
            elapsed_buckets,
            egress_dropped: self.egress_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub passes_total: u64,
    pub measured_total: u64,
    pub noise_total: u64,
    pub too_slow_total: u64,
    pub normal_total: u64,
    pub too_fast_total: u64,
    pub alerts_total: u64,
    pub max_speed_kmh: f64,
    pub last_elapsed_us: u64,
    /// Elapsed-time histogram since the last `report`
    /// Bounds: ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, ≤5120, >5120 ms
    pub elapsed_buckets: [u64; NUM_BUCKETS],
    pub egress_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            passes = %self.passes_total,
            measured = %self.measured_total,
            noise = %self.noise_total,
            too_slow = %self.too_slow_total,
            normal = %self.normal_total,
            too_fast = %self.too_fast_total,
            alerts = %self.alerts_total,
            max_speed_kmh = format!("{:.1}", self.max_speed_kmh),
            egress_dropped = %self.egress_dropped,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.passes_total(), 0);
        assert_eq!(metrics.measured_total(), 0);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(10), 0);
        assert_eq!(bucket_index(11), 1);
        assert_eq!(bucket_index(30), 2);
        assert_eq!(bucket_index(5120), 9);
        assert_eq!(bucket_index(9999), 10);
    }

    #[test]
    fn test_record_measured_and_noise() {
        let metrics = Metrics::new();
        metrics.record_measured(Duration::from_millis(30), 48.0, SpeedBand::Normal);
        metrics.record_measured(Duration::from_millis(20), 72.0, SpeedBand::TooFast);
        metrics.record_noise(Duration::from_millis(2));

        let summary = metrics.report();
        assert_eq!(summary.passes_total, 3);
        assert_eq!(summary.measured_total, 2);
        assert_eq!(summary.noise_total, 1);
        assert_eq!(summary.normal_total, 1);
        assert_eq!(summary.too_fast_total, 1);
        assert_eq!(summary.max_speed_kmh, 72.0);
        assert_eq!(summary.last_elapsed_us, 2000);
        assert_eq!(summary.elapsed_buckets[1], 1);
        assert_eq!(summary.elapsed_buckets[2], 1);
    }

    #[test]
    fn test_report_resets_histogram_only() {
        let metrics = Metrics::new();
        metrics.record_measured(Duration::from_millis(30), 48.0, SpeedBand::Normal);
        let _ = metrics.report();

        let second = metrics.report();
        assert_eq!(second.measured_total, 1);
        assert_eq!(second.elapsed_buckets.iter().sum::<u64>(), 0);
    }

    #[test]
    fn test_snapshot_leaves_histogram_for_report() {
        let metrics = Metrics::new();
        metrics.record_measured(Duration::from_millis(30), 48.0, SpeedBand::Normal);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.elapsed_buckets[2], 1);
        assert_eq!(metrics.snapshot().elapsed_buckets[2], 1);

        let report = metrics.report();
        assert_eq!(report.elapsed_buckets[2], 1);
        assert_eq!(metrics.snapshot().elapsed_buckets.iter().sum::<u64>(), 0);
    }
}
