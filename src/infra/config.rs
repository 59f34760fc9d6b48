//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Values are read once at startup and never change afterwards.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::domain::types::SpeedThresholds;

/// Configuration values that would make the control loop meaningless
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be > 0 (got {value})")]
    NonPositive { field: &'static str, value: f64 },
    #[error("speed.normal_max_kmh ({normal_max}) must be greater than speed.slow_max_kmh ({slow_max})")]
    BandOrder { slow_max: f64, normal_max: f64 },
    #[error("{field} is out of range (got {value})")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("{field} must be > 0")]
    ZeroInterval { field: &'static str },
    #[error("display.cols must be > 0")]
    ZeroColumns,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Serial,
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayKind {
    Console,
    SerialLcd,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Unique site identifier
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "speed-gate".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatesConfig {
    /// Distance between gate A and gate B (metres)
    pub distance_m: f64,
    /// Presence is reported when the measured range is below this (metres)
    pub threshold_m: f64,
    /// Minimum time between accepted triggers on one gate
    pub debounce_ms: u64,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self { distance_m: 0.40, threshold_m: 0.25, debounce_ms: 0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Passes shorter than this are rejected as noise (seconds, inclusive floor)
    pub min_valid_dt_s: f64,
    pub poll_interval_ms: u64,
    /// Poll interval while waiting for both gates to clear after a pass
    pub clear_poll_interval_ms: u64,
    /// Poll interval while waiting for both gates to clear at startup
    pub startup_clear_poll_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_valid_dt_s: 0.03,
            poll_interval_ms: 20,
            clear_poll_interval_ms: 20,
            startup_clear_poll_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub slow_max_kmh: f64,
    pub normal_max_kmh: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self { slow_max_kmh: 20.0, normal_max_kmh: 50.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    pub kind: SensorKind,
    pub a_device: String,
    pub b_device: String,
    pub baud: u32,
    /// Readings beyond this range are clamped (metres)
    pub max_distance_m: f64,
    /// A sensor with no valid frame for this long is considered failed
    pub stale_timeout_ms: u64,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            kind: SensorKind::Serial,
            a_device: "/dev/ttyUSB0".to_string(),
            b_device: "/dev/ttyUSB1".to_string(),
            baud: 9600,
            max_distance_m: 1.0,
            stale_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub speed_kmh: f64,
    /// Time between simulated passes
    pub period_ms: u64,
    /// How long the simulated object occludes each gate
    pub occlusion_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { speed_kmh: 42.0, period_ms: 4000, occlusion_ms: 150 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub kind: DisplayKind,
    pub device: String,
    pub baud: u32,
    pub cols: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            kind: DisplayKind::Console,
            device: "/dev/ttyAMA0".to_string(),
            baud: 9600,
            cols: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_alert_enabled")]
    pub enabled: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { enabled: default_alert_enabled() }
    }
}

fn default_alert_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for pass egress (JSONL format). Empty disables.
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "passes.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Topic for finished passes (QoS 1)
    pub passes_topic: String,
    /// Topic for too-fast alerts (QoS 0)
    pub alerts_topic: String,
    /// Topic for periodic metrics snapshots (QoS 0)
    pub metrics_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            passes_topic: "speedgate/passes".to_string(),
            alerts_topic: "speedgate/alerts".to_string(),
            metrics_topic: "speedgate/metrics".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub gates: GatesConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub speed: SpeedConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    gate_distance_m: f64,
    gate_threshold_m: f64,
    gate_debounce_ms: u64,
    min_valid_dt_s: f64,
    poll_interval_ms: u64,
    clear_poll_interval_ms: u64,
    startup_clear_poll_ms: u64,
    slow_max_kmh: f64,
    normal_max_kmh: f64,
    sensor_kind: SensorKind,
    sensor_a_device: String,
    sensor_b_device: String,
    sensor_baud: u32,
    sensor_max_distance_m: f64,
    sensor_stale_timeout_ms: u64,
    sim_speed_kmh: f64,
    sim_period_ms: u64,
    sim_occlusion_ms: u64,
    display_kind: DisplayKind,
    display_device: String,
    display_baud: u32,
    display_cols: usize,
    alert_enabled: bool,
    egress_file: String,
    mqtt_enabled: bool,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    mqtt_passes_topic: String,
    mqtt_alerts_topic: String,
    mqtt_metrics_topic: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            site_id: toml_config.site.id,
            gate_distance_m: toml_config.gates.distance_m,
            gate_threshold_m: toml_config.gates.threshold_m,
            gate_debounce_ms: toml_config.gates.debounce_ms,
            min_valid_dt_s: toml_config.timing.min_valid_dt_s,
            poll_interval_ms: toml_config.timing.poll_interval_ms,
            clear_poll_interval_ms: toml_config.timing.clear_poll_interval_ms,
            startup_clear_poll_ms: toml_config.timing.startup_clear_poll_ms,
            slow_max_kmh: toml_config.speed.slow_max_kmh,
            normal_max_kmh: toml_config.speed.normal_max_kmh,
            sensor_kind: toml_config.sensors.kind,
            sensor_a_device: toml_config.sensors.a_device,
            sensor_b_device: toml_config.sensors.b_device,
            sensor_baud: toml_config.sensors.baud,
            sensor_max_distance_m: toml_config.sensors.max_distance_m,
            sensor_stale_timeout_ms: toml_config.sensors.stale_timeout_ms,
            sim_speed_kmh: toml_config.simulation.speed_kmh,
            sim_period_ms: toml_config.simulation.period_ms,
            sim_occlusion_ms: toml_config.simulation.occlusion_ms,
            display_kind: toml_config.display.kind,
            display_device: toml_config.display.device,
            display_baud: toml_config.display.baud,
            display_cols: toml_config.display.cols,
            alert_enabled: toml_config.alert.enabled,
            egress_file: toml_config.egress.file,
            mqtt_enabled: toml_config.mqtt.enabled,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            mqtt_passes_topic: toml_config.mqtt.passes_topic,
            mqtt_alerts_topic: toml_config.mqtt.alerts_topic,
            mqtt_metrics_topic: toml_config.mqtt.metrics_topic,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: config_file.to_string(),
        }
    }

    /// Load configuration from a TOML file (not validated)
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load and validate configuration.
    ///
    /// A missing file falls back to defaults; an unreadable or invalid file is fatal.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            Self::from_file(path)?
        } else {
            warn!(config_file = %path.display(), "config_file_missing_using_defaults");
            Self::default()
        };

        config.validate().with_context(|| format!("Invalid configuration in {}", config.config_file))?;
        Ok(config)
    }

    /// Reject values that make measurement meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("gates.distance_m", self.gate_distance_m),
            ("gates.threshold_m", self.gate_threshold_m),
            ("timing.min_valid_dt_s", self.min_valid_dt_s),
            ("speed.slow_max_kmh", self.slow_max_kmh),
            ("speed.normal_max_kmh", self.normal_max_kmh),
        ];
        for (field, value) in positive {
            // Written as a negated comparison so NaN is rejected too
            if !(value > 0.0) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }

        if Duration::try_from_secs_f64(self.min_valid_dt_s).is_err() {
            return Err(ConfigError::OutOfRange {
                field: "timing.min_valid_dt_s",
                value: self.min_valid_dt_s,
            });
        }

        if self.normal_max_kmh <= self.slow_max_kmh {
            return Err(ConfigError::BandOrder {
                slow_max: self.slow_max_kmh,
                normal_max: self.normal_max_kmh,
            });
        }

        let intervals = [
            ("timing.poll_interval_ms", self.poll_interval_ms),
            ("timing.clear_poll_interval_ms", self.clear_poll_interval_ms),
            ("timing.startup_clear_poll_ms", self.startup_clear_poll_ms),
            ("metrics.interval_secs", self.metrics_interval_secs),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::ZeroInterval { field });
            }
        }

        if self.sensor_kind == SensorKind::Simulated && !(self.sim_speed_kmh > 0.0) {
            return Err(ConfigError::NonPositive {
                field: "simulation.speed_kmh",
                value: self.sim_speed_kmh,
            });
        }

        if self.display_cols == 0 {
            return Err(ConfigError::ZeroColumns);
        }

        Ok(())
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn gate_distance_m(&self) -> f64 {
        self.gate_distance_m
    }

    pub fn gate_threshold_m(&self) -> f64 {
        self.gate_threshold_m
    }

    pub fn gate_debounce(&self) -> Duration {
        Duration::from_millis(self.gate_debounce_ms)
    }

    /// Noise floor. `validate` guarantees the conversion succeeds.
    pub fn min_valid_dt(&self) -> Duration {
        Duration::try_from_secs_f64(self.min_valid_dt_s).unwrap_or(Duration::ZERO)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn clear_poll_interval(&self) -> Duration {
        Duration::from_millis(self.clear_poll_interval_ms)
    }

    pub fn startup_clear_poll(&self) -> Duration {
        Duration::from_millis(self.startup_clear_poll_ms)
    }

    pub fn speed_thresholds(&self) -> SpeedThresholds {
        SpeedThresholds { slow_max_kmh: self.slow_max_kmh, normal_max_kmh: self.normal_max_kmh }
    }

    pub fn sensor_kind(&self) -> SensorKind {
        self.sensor_kind
    }

    pub fn sensor_a_device(&self) -> &str {
        &self.sensor_a_device
    }

    pub fn sensor_b_device(&self) -> &str {
        &self.sensor_b_device
    }

    pub fn sensor_baud(&self) -> u32 {
        self.sensor_baud
    }

    pub fn sensor_max_distance_m(&self) -> f64 {
        self.sensor_max_distance_m
    }

    pub fn sensor_stale_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_stale_timeout_ms)
    }

    pub fn sim_speed_kmh(&self) -> f64 {
        self.sim_speed_kmh
    }

    pub fn sim_period(&self) -> Duration {
        Duration::from_millis(self.sim_period_ms)
    }

    pub fn sim_occlusion(&self) -> Duration {
        Duration::from_millis(self.sim_occlusion_ms)
    }

    pub fn display_kind(&self) -> DisplayKind {
        self.display_kind
    }

    pub fn display_device(&self) -> &str {
        &self.display_device
    }

    pub fn display_baud(&self) -> u32 {
        self.display_baud
    }

    pub fn display_cols(&self) -> usize {
        self.display_cols
    }

    pub fn alert_enabled(&self) -> bool {
        self.alert_enabled
    }

    /// Egress file path, `None` when egress is disabled
    pub fn egress_file(&self) -> Option<&str> {
        if self.egress_file.is_empty() {
            None
        } else {
            Some(&self.egress_file)
        }
    }

    pub fn mqtt_enabled(&self) -> bool {
        self.mqtt_enabled
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn mqtt_passes_topic(&self) -> &str {
        &self.mqtt_passes_topic
    }

    pub fn mqtt_alerts_topic(&self) -> &str {
        &self.mqtt_alerts_topic
    }

    pub fn mqtt_metrics_topic(&self) -> &str {
        &self.mqtt_metrics_topic
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Switch to the scripted sensor pair (used by `--simulate`)
    pub fn with_simulated_sensors(mut self) -> Self {
        self.sensor_kind = SensorKind::Simulated;
        self
    }

    /// Builder method for tests to set the gate spacing
    #[cfg(test)]
    pub fn with_distance_m(mut self, distance_m: f64) -> Self {
        self.gate_distance_m = distance_m;
        self
    }

    /// Builder method for tests to set the noise floor
    #[cfg(test)]
    pub fn with_min_valid_dt_s(mut self, seconds: f64) -> Self {
        self.min_valid_dt_s = seconds;
        self
    }

    /// Builder method for tests to set the edge debounce
    #[cfg(test)]
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.gate_debounce_ms = ms;
        self
    }

    /// Builder method for tests to set the speed bands
    #[cfg(test)]
    pub fn with_speed_bands(mut self, slow_max_kmh: f64, normal_max_kmh: f64) -> Self {
        self.slow_max_kmh = slow_max_kmh;
        self.normal_max_kmh = normal_max_kmh;
        self
    }

    /// Builder method for tests to set the poll interval
    #[cfg(test)]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self.clear_poll_interval_ms = ms;
        self.startup_clear_poll_ms = ms;
        self
    }
}
