//! Gate presence sensors
//!
//! `GateSensor` is the narrow interface the speed trap polls. Hardware
//! adapters live in `rangefinder`; `ScriptedSensor` replays occupancy windows
//! on the monotonic clock for bench runs and tests.

use crate::domain::types::MPS_TO_KMH;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Presence signal for one gate, queried once per gate per poll
#[async_trait]
pub trait GateSensor: Send {
    /// Whether an object currently occupies the gate.
    ///
    /// An error means the sensor is unusable; the caller treats it as fatal.
    async fn is_occupied(&mut self) -> anyhow::Result<bool>;
}

/// Occupancy defined by `[from, to)` windows relative to an origin instant
#[derive(Debug, Clone)]
pub struct ScriptedSensor {
    origin: Instant,
    windows: Vec<(Duration, Duration)>,
    period: Option<Duration>,
}

impl ScriptedSensor {
    pub fn new(origin: Instant, windows: Vec<(Duration, Duration)>) -> Self {
        Self { origin, windows, period: None }
    }

    /// A sensor that never reports presence
    pub fn always_clear(origin: Instant) -> Self {
        Self::new(origin, Vec::new())
    }

    /// Replay the windows every `period`
    pub fn repeating(mut self, period: Duration) -> Self {
        if !period.is_zero() {
            self.period = Some(period);
        }
        self
    }

    pub fn occupied_at(&self, now: Instant) -> bool {
        let mut offset = now.saturating_duration_since(self.origin);
        if let Some(period) = self.period {
            let nanos = offset.as_nanos() % period.as_nanos();
            offset = Duration::from_nanos(nanos as u64);
        }
        self.windows.iter().any(|&(from, to)| offset >= from && offset < to)
    }
}

#[async_trait]
impl GateSensor for ScriptedSensor {
    async fn is_occupied(&mut self) -> anyhow::Result<bool> {
        Ok(self.occupied_at(Instant::now()))
    }
}

/// Build an A/B pair that replays one pass per `period` at `speed_kmh`.
///
/// Each pass starts half a period after the origin; each gate is occluded for
/// `occlusion`.
pub fn simulated_pair(
    origin: Instant,
    distance_m: f64,
    speed_kmh: f64,
    occlusion: Duration,
    period: Duration,
) -> (ScriptedSensor, ScriptedSensor) {
    let lead_in = period / 2;
    let transit = Duration::try_from_secs_f64(distance_m / (speed_kmh / MPS_TO_KMH))
        .unwrap_or(Duration::ZERO);

    let a = ScriptedSensor::new(origin, vec![(lead_in, lead_in + occlusion)]).repeating(period);
    let b_start = lead_in + transit;
    let b = ScriptedSensor::new(origin, vec![(b_start, b_start + occlusion)]).repeating(period);
    (a, b)
}
