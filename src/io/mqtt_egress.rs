//! MQTT publisher for egress events
//!
//! Publishes speed gate events to MQTT topics for downstream consumers:
//! - speedgate/passes - Finished pass records (QoS 1)
//! - speedgate/alerts - Too-fast alerts (QoS 0)
//! - speedgate/metrics - Periodic metrics snapshots (QoS 0)

use crate::infra::config::Config;
use crate::io::egress_channel::EgressMessage;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Upper bound on publishing the backlog and disconnecting at shutdown
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// MQTT publisher actor
///
/// Receives messages from the egress channel and publishes to MQTT topics.
pub struct MqttPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<EgressMessage>,
    passes_topic: String,
    alerts_topic: String,
    metrics_topic: String,
    eventloop_task: JoinHandle<()>,
}

impl MqttPublisher {
    /// Create a new MQTT publisher and spawn its connection event loop
    pub fn new(config: &Config, rx: mpsc::Receiver<EgressMessage>) -> Self {
        let client_id = format!("speed-gate-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        let eventloop_task = tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_egress_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        debug!("mqtt_egress_puback");
                    }
                    // Everything queued before the disconnect has been written
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!("mqtt_egress_disconnected");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_egress_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            rx,
            passes_topic: config.mqtt_passes_topic().to_string(),
            alerts_topic: config.mqtt_alerts_topic().to_string(),
            metrics_topic: config.mqtt_metrics_topic().to_string(),
            eventloop_task,
        }
    }

    /// Run the publisher loop until shutdown, draining queued messages on exit
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            passes = %self.passes_topic,
            alerts = %self.alerts_topic,
            metrics = %self.metrics_topic,
            "mqtt_egress_started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("mqtt_egress_shutdown");
                        break;
                    }
                }
                msg = self.rx.recv() => {
                    match msg {
                        Some(msg) => self.publish_message(msg).await,
                        None => break,
                    }
                }
            }
        }

        self.flush().await;
    }

    /// Publish what is still queued, then disconnect once the event loop has sent it
    async fn flush(mut self) {
        let drain = async {
            while let Ok(msg) = self.rx.try_recv() {
                self.publish_message(msg).await;
            }
            if let Err(e) = self.client.disconnect().await {
                debug!(error = %e, "mqtt_egress_disconnect_failed");
                return;
            }
            if let Err(e) = (&mut self.eventloop_task).await {
                debug!(error = %e, "mqtt_egress_eventloop_join_failed");
            }
        };

        if tokio::time::timeout(FLUSH_TIMEOUT, drain).await.is_err() {
            warn!(timeout_ms = %FLUSH_TIMEOUT.as_millis(), "mqtt_egress_flush_timeout");
        }
        self.eventloop_task.abort();
    }

    async fn publish_message(&self, msg: EgressMessage) {
        match msg {
            EgressMessage::Pass(payload) => {
                // QoS 1 for passes (at-least-once delivery)
                if let Err(e) = self
                    .client
                    .publish(&self.passes_topic, QoS::AtLeastOnce, false, payload.json.into_bytes())
                    .await
                {
                    error!(error = %e, "mqtt_egress_pass_failed");
                }
            }
            EgressMessage::Alert(payload) => {
                if let Ok(json) = serde_json::to_string(&payload) {
                    if let Err(e) = self
                        .client
                        .publish(&self.alerts_topic, QoS::AtMostOnce, false, json.into_bytes())
                        .await
                    {
                        debug!(error = %e, "mqtt_egress_alert_failed");
                    }
                }
            }
            EgressMessage::Metrics(payload) => {
                if let Ok(json) = serde_json::to_string(&payload) {
                    if let Err(e) = self
                        .client
                        .publish(&self.metrics_topic, QoS::AtMostOnce, false, json.into_bytes())
                        .await
                    {
                        debug!(error = %e, "mqtt_egress_metrics_failed");
                    }
                }
            }
        }
    }
}
