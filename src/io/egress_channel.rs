//! Typed channel for MQTT egress messages
//!
//! Provides a non-blocking way to hand messages to the MQTT publisher.
//! Uses a bounded mpsc channel; when it is full, messages are dropped and
//! counted rather than stalling the control loop.

use crate::domain::pass::{epoch_ms, PassRecord};
use crate::domain::types::Measurement;
use crate::infra::metrics::{Metrics, MetricsSummary};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Messages that can be sent to the MQTT publisher
#[derive(Debug)]
pub enum EgressMessage {
    /// Finished pass (measured or noise)
    Pass(PassPayload),
    /// Too-fast alert
    Alert(AlertPayload),
    /// Periodic metrics snapshot
    Metrics(MetricsPayload),
}

/// Pre-serialized pass record
#[derive(Debug)]
pub struct PassPayload {
    pub json: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub site: String,
    /// Timestamp (epoch ms)
    pub ts: u64,
    pub speed_kmh: f64,
    pub elapsed_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct MetricsPayload {
    pub site: String,
    /// Timestamp (epoch ms)
    pub ts: u64,
    #[serde(flatten)]
    pub summary: MetricsSummary,
}

/// Sender handle for egress messages
///
/// Clone this to share across multiple producers.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<EgressMessage>,
    site_id: String,
    metrics: Arc<Metrics>,
}

impl EgressSender {
    pub fn new(tx: mpsc::Sender<EgressMessage>, site_id: String, metrics: Arc<Metrics>) -> Self {
        Self { tx, site_id, metrics }
    }

    fn try_send(&self, msg: EgressMessage) {
        if self.tx.try_send(msg).is_err() {
            self.metrics.record_egress_dropped();
        }
    }

    /// Send a finished pass, tagged with the site id
    pub fn send_pass(&self, record: &PassRecord) {
        let json = record.clone().with_site(&self.site_id).to_json();
        self.try_send(EgressMessage::Pass(PassPayload { json }));
    }

    pub fn send_alert(&self, measurement: &Measurement) {
        let payload = AlertPayload {
            site: self.site_id.clone(),
            ts: epoch_ms(),
            speed_kmh: measurement.speed_kmh(),
            elapsed_ms: measurement.elapsed().as_secs_f64() * 1000.0,
        };
        self.try_send(EgressMessage::Alert(payload));
    }

    pub fn send_metrics(&self, summary: MetricsSummary) {
        let payload = MetricsPayload { site: self.site_id.clone(), ts: epoch_ms(), summary };
        self.try_send(EgressMessage::Metrics(payload));
    }
}

/// Create a new egress channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
pub fn create_egress_channel(
    buffer_size: usize,
    site_id: String,
    metrics: Arc<Metrics>,
) -> (EgressSender, mpsc::Receiver<EgressMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EgressSender::new(tx, site_id, metrics), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SpeedBand;
    use std::time::Duration;

    #[test]
    fn test_send_pass_injects_site() {
        let metrics = Arc::new(Metrics::new());
        let (sender, mut rx) = create_egress_channel(4, "lab".to_string(), metrics);
        let m = Measurement::new(Duration::from_millis(30), 0.40);

        sender.send_pass(&PassRecord::measured(&m, SpeedBand::Normal));

        match rx.try_recv().unwrap() {
            EgressMessage::Pass(payload) => {
                let parsed: serde_json::Value = serde_json::from_str(&payload.json).unwrap();
                assert_eq!(parsed["site"], "lab");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_full_channel_counts_drops() {
        let metrics = Arc::new(Metrics::new());
        let (sender, _rx) = create_egress_channel(1, "lab".to_string(), metrics.clone());
        let m = Measurement::new(Duration::from_millis(10), 0.40);

        sender.send_alert(&m);
        sender.send_alert(&m);
        sender.send_alert(&m);

        assert_eq!(metrics.report().egress_dropped, 2);
    }

    #[test]
    fn test_metrics_payload_is_flat() {
        let metrics = Arc::new(Metrics::new());
        let payload =
            MetricsPayload { site: "lab".to_string(), ts: 1, summary: metrics.report() };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["site"], "lab");
        assert_eq!(json["passes_total"], 0);
    }
}
