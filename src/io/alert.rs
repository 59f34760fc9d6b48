//! Too-fast alerts
//!
//! Alerts are fire-and-forget: `alert` must return immediately and never
//! fail the control loop.

use crate::domain::types::Measurement;
use crate::io::egress_channel::EgressSender;
use tracing::warn;

pub trait AlertSink: Send {
    fn alert(&mut self, measurement: &Measurement);
}

/// Alert as a warning-level log event
#[derive(Debug, Default)]
pub struct LogAlert;

impl AlertSink for LogAlert {
    fn alert(&mut self, measurement: &Measurement) {
        warn!(
            speed_kmh = format!("{:.1}", measurement.speed_kmh()),
            elapsed_ms = %measurement.elapsed().as_millis(),
            "speed_alert"
        );
    }
}

impl AlertSink for EgressSender {
    fn alert(&mut self, measurement: &Measurement) {
        self.send_alert(measurement);
    }
}

/// Forward one alert to several sinks
#[derive(Default)]
pub struct AlertFanout {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl AlertFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AlertSink for AlertFanout {
    fn alert(&mut self, measurement: &Measurement) {
        for sink in &mut self.sinks {
            sink.alert(measurement);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Counting(Arc<AtomicUsize>);

    impl AlertSink for Counting {
        fn alert(&mut self, _measurement: &Measurement) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut fanout = AlertFanout::new()
            .with(Box::new(Counting(count.clone())))
            .with(Box::new(LogAlert))
            .with(Box::new(Counting(count.clone())));
        assert!(!fanout.is_empty());

        fanout.alert(&Measurement::new(Duration::from_millis(10), 0.40));
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }
}
