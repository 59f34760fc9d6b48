//! Pass records written to egress once a pass has finished

use crate::domain::types::{Measurement, NoiseRejected, SpeedBand};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    Measured,
    NoiseRejected,
}

impl PassOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassOutcome::Measured => "measured",
            PassOutcome::NoiseRejected => "noise_rejected",
        }
    }
}

/// One finished pass, measured or rejected
#[derive(Debug, Clone, Serialize)]
pub struct PassRecord {
    /// UUIDv7 pass ID
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    /// Wall-clock time the pass finished (RFC 3339). Informational only.
    pub at: String,
    /// Epoch milliseconds, same instant as `at`
    pub ts: u64,
    pub outcome: PassOutcome,
    pub elapsed_ms: f64,
    pub distance_m: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<SpeedBand>,
}

impl PassRecord {
    fn base(outcome: PassOutcome, elapsed: Duration, distance_m: f64) -> Self {
        Self {
            id: new_uuid_v7(),
            site: None,
            at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ts: epoch_ms(),
            outcome,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            distance_m,
            speed_kmh: None,
            band: None,
        }
    }

    pub fn measured(measurement: &Measurement, band: SpeedBand) -> Self {
        let mut record =
            Self::base(PassOutcome::Measured, measurement.elapsed(), measurement.distance_m());
        record.speed_kmh = Some(measurement.speed_kmh());
        record.band = Some(band);
        record
    }

    pub fn noise(rejected: &NoiseRejected, distance_m: f64) -> Self {
        Self::base(PassOutcome::NoiseRejected, rejected.elapsed, distance_m)
    }

    pub fn with_site(mut self, site: &str) -> Self {
        self.site = Some(site.to_string());
        self
    }

    /// Serialize to a single JSON line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
