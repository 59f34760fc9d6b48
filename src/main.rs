//! speed-gate - two-gate speed trap
//!
//! Times an object between two presence gates a fixed distance apart and
//! shows the speed on a character display.
//!
//! Module structure:
//! - `domain/` - Core types (GateId, SpeedBand, Measurement, PassRecord)
//! - `io/` - External interfaces (sensors, display, alerts, egress, MQTT)
//! - `services/` - Measurement logic and the SpeedTrap polling loop
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use speed_gate::infra::{Config, DisplayKind, Metrics, SensorKind};
use speed_gate::io::{
    create_egress_channel, simulated_pair, AlertFanout, AlertSink, CharDisplay, Egress, GateSensor,
    LogAlert, MqttPublisher, ResultSink, SerialRangefinder,
};
use speed_gate::domain::GateId;
use speed_gate::services::SpeedTrap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// speed-gate - measure and display speed between two gates
#[derive(Parser, Debug)]
#[command(name = "speed-gate", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Use scripted sensors instead of the rangefinders
    #[arg(long)]
    simulate: bool,
}

fn build_sensors(config: &Config) -> anyhow::Result<(Box<dyn GateSensor>, Box<dyn GateSensor>)> {
    match config.sensor_kind() {
        SensorKind::Serial => {
            let a: Box<dyn GateSensor> = Box::new(SerialRangefinder::open(
                GateId::A,
                config.sensor_a_device(),
                config.sensor_baud(),
                config.gate_threshold_m(),
                config.sensor_max_distance_m(),
                config.sensor_stale_timeout(),
            )?);
            let b: Box<dyn GateSensor> = Box::new(SerialRangefinder::open(
                GateId::B,
                config.sensor_b_device(),
                config.sensor_baud(),
                config.gate_threshold_m(),
                config.sensor_max_distance_m(),
                config.sensor_stale_timeout(),
            )?);
            Ok((a, b))
        }
        SensorKind::Simulated => {
            let (a, b) = simulated_pair(
                Instant::now(),
                config.gate_distance_m(),
                config.sim_speed_kmh(),
                config.sim_occlusion(),
                config.sim_period(),
            );
            info!(
                speed_kmh = %config.sim_speed_kmh(),
                period_ms = %config.sim_period().as_millis(),
                "simulated_sensors"
            );
            let a: Box<dyn GateSensor> = Box::new(a);
            let b: Box<dyn GateSensor> = Box::new(b);
            Ok((a, b))
        }
    }
}

fn build_display(config: &Config) -> anyhow::Result<Box<dyn ResultSink>> {
    match config.display_kind() {
        DisplayKind::Console => Ok(Box::new(CharDisplay::console(config.display_cols()))),
        DisplayKind::SerialLcd => Ok(Box::new(CharDisplay::serial_lcd(
            config.display_device(),
            config.display_baud(),
            config.display_cols(),
        )?)),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=trace to see every gate sample
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git = %env!("GIT_HASH"), "speed-gate starting");

    let args = Args::parse();

    let config_path = Config::resolve_config_path(args.config.as_deref());
    let mut config = Config::load_from_path(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    if args.simulate {
        config = config.with_simulated_sensors();
        config.validate().context("Invalid simulation settings")?;
    }

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        distance_m = %config.gate_distance_m(),
        threshold_m = %config.gate_threshold_m(),
        min_valid_dt_ms = %config.min_valid_dt().as_millis(),
        slow_max_kmh = %config.speed_thresholds().slow_max_kmh,
        normal_max_kmh = %config.speed_thresholds().normal_max_kmh,
        sensors = ?config.sensor_kind(),
        display = ?config.display_kind(),
        mqtt_enabled = %config.mqtt_enabled(),
        "config_loaded"
    );

    // Create shutdown signal (shared so main can stop the workers after a fault)
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let metrics = Arc::new(Metrics::new());

    let (sensor_a, sensor_b) = build_sensors(&config)?;
    let display = build_display(&config)?;

    // Start metrics reporter (lock-free reads, owns the histogram reset)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    let mut reporter_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            tokio::select! {
                _ = reporter_shutdown.changed() => break,
                _ = interval.tick() => metrics_clone.report().log(),
            }
        }
    });

    // Create MQTT egress channel and publisher (if enabled)
    let (egress_sender, publisher_task) = if config.mqtt_enabled() {
        let (egress_sender, egress_rx) =
            create_egress_channel(256, config.site_id().to_string(), metrics.clone());

        let publisher = MqttPublisher::new(&config, egress_rx);
        let publisher_shutdown = shutdown_rx.clone();
        let publisher_task = tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });

        // Periodic metrics snapshots on the metrics topic; the histogram is left to the reporter
        let metrics_egress = egress_sender.clone();
        let metrics_for_egress = metrics.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                metrics_egress.send_metrics(metrics_for_egress.snapshot());
            }
        });

        (Some(egress_sender), Some(publisher_task))
    } else {
        (None, None)
    };

    let mut trap = SpeedTrap::new(&config, sensor_a, sensor_b, display, metrics);

    if config.alert_enabled() {
        let mut alerts = AlertFanout::new().with(Box::new(LogAlert));
        if let Some(ref sender) = egress_sender {
            alerts = alerts.with(Box::new(sender.clone()) as Box<dyn AlertSink>);
        }
        trap = trap.with_alert(Box::new(alerts));
    }
    if let Some(path) = config.egress_file() {
        trap = trap.with_egress(Egress::new(path));
    }
    if let Some(sender) = egress_sender {
        trap = trap.with_egress_sender(sender);
    }

    // Handle shutdown on Ctrl+C
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = signal_tx.send(true);
    });

    let result = trap.run(shutdown_rx).await;

    // Also reached on a fatal error, where no signal was sent
    let _ = shutdown_tx.send(true);
    if let Some(task) = publisher_task {
        // The publisher bounds its own flush; this only guards a stuck publish
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            warn!("mqtt_egress_shutdown_timeout");
        }
    }

    match &result {
        Ok(()) => info!("speed-gate shutdown complete"),
        Err(e) => error!(error = %e, "speed-gate stopped on fatal error"),
    }
    result
}
