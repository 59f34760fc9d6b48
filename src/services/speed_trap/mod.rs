//! Speed trap session and polling loop
//!
//! The SpeedTrap owns everything one measuring session needs:
//! - Both gate sensors and their edge monitors
//! - The pass timer, speed estimator and band thresholds
//! - The result display, optional alert sink and egress outputs
//!
//! One cycle: wait for gate A, wait for gate B, report the result, wait for
//! both gates to clear, then re-arm. Shutdown is observed on every tick and
//! inside every wait.


use crate::domain::pass::PassRecord;
use crate::domain::types::{GateId, SpeedBand, SpeedThresholds};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::alert::AlertSink;
use crate::io::display::ResultSink;
use crate::io::egress::Egress;
use crate::io::sensor::GateSensor;
use crate::io::EgressSender;
use crate::services::estimator::SpeedEstimator;
use crate::services::gate_monitor::GateMonitor;
use crate::services::pass_timer::{PassState, PassTimer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// One measuring session between two gates
pub struct SpeedTrap {
    sensor_a: Box<dyn GateSensor>,
    sensor_b: Box<dyn GateSensor>,
    gate_a: GateMonitor,
    gate_b: GateMonitor,
    timer: PassTimer,
    estimator: SpeedEstimator,
    thresholds: SpeedThresholds,
    sink: Box<dyn ResultSink>,
    /// Invoked on too-fast results
    alert: Option<Box<dyn AlertSink>>,
    /// JSONL pass log (optional)
    egress: Option<Egress>,
    /// MQTT egress sender (optional)
    egress_sender: Option<EgressSender>,
    metrics: Arc<Metrics>,
    poll_interval: Duration,
    clear_poll_interval: Duration,
    startup_clear_poll: Duration,
}

impl SpeedTrap {
    pub fn new(
        config: &Config,
        sensor_a: Box<dyn GateSensor>,
        sensor_b: Box<dyn GateSensor>,
        sink: Box<dyn ResultSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            sensor_a,
            sensor_b,
            gate_a: GateMonitor::new(GateId::A, config.gate_debounce()),
            gate_b: GateMonitor::new(GateId::B, config.gate_debounce()),
            timer: PassTimer::new(),
            estimator: SpeedEstimator::new(config.gate_distance_m(), config.min_valid_dt()),
            thresholds: config.speed_thresholds(),
            sink,
            alert: None,
            egress: None,
            egress_sender: None,
            metrics,
            poll_interval: config.poll_interval(),
            clear_poll_interval: config.clear_poll_interval(),
            startup_clear_poll: config.startup_clear_poll(),
        }
    }

    pub fn with_alert(mut self, alert: Box<dyn AlertSink>) -> Self {
        self.alert = Some(alert);
        self
    }

    pub fn with_egress(mut self, egress: Egress) -> Self {
        self.egress = Some(egress);
        self
    }

    pub fn with_egress_sender(mut self, sender: EgressSender) -> Self {
        self.egress_sender = Some(sender);
        self
    }

    pub fn pass_state(&self) -> PassState {
        self.timer.state()
    }

    /// Run until shutdown or a fatal sensor error.
    ///
    /// The display always ends in a terminal frame: stopped on shutdown,
    /// fault on error.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            distance_m = %self.estimator.distance_m(),
            min_valid_dt_ms = %self.estimator.min_valid_dt().as_millis(),
            slow_max_kmh = %self.thresholds.slow_max_kmh,
            normal_max_kmh = %self.thresholds.normal_max_kmh,
            poll_ms = %self.poll_interval.as_millis(),
            "speed_trap_started"
        );

        let result = self.run_loop(&mut shutdown).await;
        match &result {
            Ok(()) => {
                self.sink.show_stopped().await;
                info!(
                    passes = %self.metrics.passes_total(),
                    state = %self.timer.state().as_str(),
                    "speed_trap_stopped"
                );
            }
            Err(e) => {
                error!(error = %e, state = %self.timer.state().as_str(), "speed_trap_fault");
                self.sink.show_fault(&e.to_string()).await;
            }
        }
        result
    }

    async fn run_loop(&mut self, shutdown: &mut watch::Receiver<bool>) -> anyhow::Result<()> {
        self.sink.show_waiting().await;

        // An object parked in front of a gate at boot must not start a pass
        if !self.wait_for_clear(self.startup_clear_poll, shutdown).await? {
            return Ok(());
        }
        self.gate_a.rearm(false);
        self.gate_b.rearm(false);

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
                _ = ticker.tick() => {
                    if self.poll_once().await? {
                        if !self.wait_for_clear(self.clear_poll_interval, shutdown).await? {
                            return Ok(());
                        }
                        self.gate_a.rearm(false);
                        self.gate_b.rearm(false);
                        self.timer.reset();
                        self.sink.show_waiting().await;
                        debug!("pass_rearmed");
                    }
                }
            }
        }
    }

    /// Sample the gates once. Returns `true` when a pass finished this tick.
    ///
    /// Gate A is only read while idle and gate B only while armed; both use
    /// the same timestamp so a same-tick A and B yields zero elapsed time.
    async fn poll_once(&mut self) -> anyhow::Result<bool> {
        let now = Instant::now();

        // Both sensors are read every tick so neither port builds a backlog
        let occupied_a = self.sensor_a.is_occupied().await?;
        let occupied_b = self.sensor_b.is_occupied().await?;
        trace!(a = %occupied_a, b = %occupied_b, "gate_sample");

        if self.timer.state() == PassState::Idle
            && self.gate_a.sample(occupied_a, now)
            && self.timer.start(now)
        {
            info!("pass_armed");
            self.sink.show_measuring().await;
        }

        // B only counts once A has started the timer
        if self.timer.state() == PassState::Armed && self.gate_b.sample(occupied_b, now) {
            self.timer.stop(now);
        }

        if self.timer.state() == PassState::Completed {
            self.complete_pass().await;
            return Ok(true);
        }
        Ok(false)
    }

    async fn complete_pass(&mut self) {
        let Some(elapsed) = self.timer.elapsed() else {
            return;
        };

        let record = match self.estimator.estimate(elapsed) {
            Ok(measurement) => {
                let band = self.thresholds.classify(measurement.speed_kmh());
                info!(
                    speed_kmh = format!("{:.1}", measurement.speed_kmh()),
                    elapsed_ms = %elapsed.as_millis(),
                    band = %band,
                    "pass_measured"
                );
                self.metrics.record_measured(elapsed, measurement.speed_kmh(), band);
                self.sink.show_result(measurement.speed_kmh(), band).await;

                if band == SpeedBand::TooFast {
                    if let Some(alert) = self.alert.as_mut() {
                        alert.alert(&measurement);
                        self.metrics.record_alert();
                    }
                }
                PassRecord::measured(&measurement, band)
            }
            Err(rejected) => {
                warn!(
                    elapsed_us = %rejected.elapsed.as_micros(),
                    min_valid_dt_us = %rejected.min_valid_dt.as_micros(),
                    "pass_noise_rejected"
                );
                self.metrics.record_noise(elapsed);
                self.sink.show_noise_rejected(elapsed).await;
                PassRecord::noise(&rejected, self.estimator.distance_m())
            }
        };

        if let Some(ref egress) = self.egress {
            egress.write_pass(&record);
        }
        if let Some(ref sender) = self.egress_sender {
            sender.send_pass(&record);
        }
    }

    /// Poll both gates every `every` until both read clear.
    ///
    /// Returns `Ok(false)` if shutdown was requested first.
    async fn wait_for_clear(
        &mut self,
        every: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<bool> {
        let mut logged = false;
        loop {
            if *shutdown.borrow() {
                return Ok(false);
            }

            let a = self.sensor_a.is_occupied().await?;
            let b = self.sensor_b.is_occupied().await?;
            if !a && !b {
                if logged {
                    debug!("gates_clear");
                }
                return Ok(true);
            }
            if !logged {
                debug!(a = %a, b = %b, "waiting_for_clear");
                logged = true;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(false);
                    }
                }
                _ = sleep(every) => {}
            }
        }
    }
}
