//! Speed estimation from gate-to-gate elapsed time

use crate::domain::types::{Measurement, NoiseRejected};
use std::time::Duration;

/// Converts elapsed time over a fixed gate spacing into a speed.
///
/// The noise floor is inclusive: `elapsed == min_valid_dt` is a valid
/// measurement. There is deliberately no upper speed bound.
#[derive(Debug, Clone, Copy)]
pub struct SpeedEstimator {
    distance_m: f64,
    min_valid_dt: Duration,
}

impl SpeedEstimator {
    pub fn new(distance_m: f64, min_valid_dt: Duration) -> Self {
        Self { distance_m, min_valid_dt }
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn min_valid_dt(&self) -> Duration {
        self.min_valid_dt
    }

    pub fn estimate(&self, elapsed: Duration) -> Result<Measurement, NoiseRejected> {
        if elapsed < self.min_valid_dt {
            return Err(NoiseRejected { elapsed, min_valid_dt: self.min_valid_dt });
        }
        Ok(Measurement::new(elapsed, self.distance_m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-6, "expected {expected}, got {actual}");
    }

    #[test]
    fn test_speed_formula_over_range() {
        let estimator = SpeedEstimator::new(0.40, Duration::from_millis(30));
        for ms in [30u64, 31, 45, 100, 250, 1000, 60_000] {
            let elapsed = Duration::from_millis(ms);
            let m = estimator.estimate(elapsed).unwrap();
            assert_close(m.speed_kmh(), 0.40 / elapsed.as_secs_f64() * 3.6);
            assert_eq!(m.elapsed(), elapsed);
        }
    }

    #[test]
    fn test_below_floor_is_noise_regardless_of_distance() {
        for distance in [0.01, 0.40, 1.30, 500.0] {
            let estimator = SpeedEstimator::new(distance, Duration::from_millis(30));
            for us in [0u64, 1, 10_000, 29_999] {
                let err = estimator.estimate(Duration::from_micros(us)).unwrap_err();
                assert_eq!(err.elapsed, Duration::from_micros(us));
                assert_eq!(err.min_valid_dt, Duration::from_millis(30));
            }
        }
    }

    #[test]
    fn test_floor_is_inclusive_at_30ms() {
        // 0.40 m in exactly 0.030 s
        let estimator =
            SpeedEstimator::new(0.40, Duration::from_secs_f64(0.03));
        let m = estimator.estimate(Duration::from_secs_f64(0.03)).unwrap();
        assert_close(m.speed_kmh(), 48.0);
    }

    #[test]
    fn test_floor_is_inclusive_at_50ms() {
        // 1.30 m in exactly 0.050 s: `>=` keeps it, a strict `>` would not
        let estimator =
            SpeedEstimator::new(1.30, Duration::from_secs_f64(0.05));
        let m = estimator.estimate(Duration::from_secs_f64(0.05)).unwrap();
        assert_close(m.speed_kmh(), 93.6);
    }

    #[test]
    fn test_no_upper_bound() {
        let estimator = SpeedEstimator::new(100.0, Duration::from_micros(1));
        let m = estimator.estimate(Duration::from_micros(1)).unwrap();
        assert!(m.speed_kmh() > 1.0e8);
    }
}
