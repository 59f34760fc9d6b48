//! Shared types for the speed gate

use serde::Serialize;
use std::time::Duration;

/// Conversion factor from metres per second to kilometres per hour
pub const MPS_TO_KMH: f64 = 3.6;

/// Identity of a detection gate. `A` is the near gate that starts a pass,
/// `B` the far gate that stops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GateId {
    A,
    B,
}

impl GateId {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateId::A => "a",
            GateId::B => "b",
        }
    }
}

impl std::fmt::Display for GateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speed band a measurement falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedBand {
    TooSlow,
    Normal,
    TooFast,
}

impl SpeedBand {
    /// Machine name used in logs and egress payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedBand::TooSlow => "too_slow",
            SpeedBand::Normal => "normal",
            SpeedBand::TooFast => "too_fast",
        }
    }

    /// Human label shown on the display
    pub fn label(&self) -> &'static str {
        match self {
            SpeedBand::TooSlow => "Too slow",
            SpeedBand::Normal => "Normal",
            SpeedBand::TooFast => "Too fast!",
        }
    }
}

impl std::fmt::Display for SpeedBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Band limits in km/h. Both limits belong to the `Normal` band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedThresholds {
    pub slow_max_kmh: f64,
    pub normal_max_kmh: f64,
}

/// Result of a completed pass whose elapsed time passed the noise floor.
///
/// Only `SpeedEstimator` builds these, so every value in circulation
/// satisfies `elapsed >= min_valid_dt`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    elapsed: Duration,
    distance_m: f64,
    speed_kmh: f64,
}

impl Measurement {
    pub(crate) fn new(elapsed: Duration, distance_m: f64) -> Self {
        let speed_kmh = distance_m / elapsed.as_secs_f64() * MPS_TO_KMH;
        Self { elapsed, distance_m, speed_kmh }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }
}

/// A pass too short to be a physical transit at the configured gate spacing
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("pass rejected as noise: elapsed {elapsed:?} below floor {min_valid_dt:?}")]
pub struct NoiseRejected {
    pub elapsed: Duration,
    pub min_valid_dt: Duration,
}
