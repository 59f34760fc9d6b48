//! Speed band classification

use crate::domain::types::{SpeedBand, SpeedThresholds};

/// Strict comparisons put both limits in the `Normal` band.
pub fn classify(speed_kmh: f64, slow_max: f64, normal_max: f64) -> SpeedBand {
    if speed_kmh > normal_max {
        SpeedBand::TooFast
    } else if speed_kmh < slow_max {
        SpeedBand::TooSlow
    } else {
        SpeedBand::Normal
    }
}

impl SpeedThresholds {
    pub fn classify(&self, speed_kmh: f64) -> SpeedBand {
        classify(speed_kmh, self.slow_max_kmh, self.normal_max_kmh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLOW: f64 = 20.0;
    const NORMAL: f64 = 50.0;
    const EPS: f64 = 1e-9;

    #[test]
    fn test_boundaries_are_normal() {
        assert_eq!(classify(SLOW, SLOW, NORMAL), SpeedBand::Normal);
        assert_eq!(classify(NORMAL, SLOW, NORMAL), SpeedBand::Normal);
    }

    #[test]
    fn test_just_outside_boundaries() {
        assert_eq!(classify(NORMAL + EPS, SLOW, NORMAL), SpeedBand::TooFast);
        assert_eq!(classify(SLOW - EPS, SLOW, NORMAL), SpeedBand::TooSlow);
    }

    #[test]
    fn test_typical_values() {
        assert_eq!(classify(0.0, SLOW, NORMAL), SpeedBand::TooSlow);
        assert_eq!(classify(48.0, SLOW, NORMAL), SpeedBand::Normal);
        assert_eq!(classify(93.6, SLOW, NORMAL), SpeedBand::TooFast);
        assert_eq!(classify(f64::INFINITY, SLOW, NORMAL), SpeedBand::TooFast);
    }

    #[test]
    fn test_thresholds_method() {
        let thresholds = SpeedThresholds { slow_max_kmh: 10.0, normal_max_kmh: 30.0 };
        assert_eq!(thresholds.classify(48.0), SpeedBand::TooFast);
        assert_eq!(thresholds.classify(30.0), SpeedBand::Normal);
    }
}
