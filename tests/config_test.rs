//! Integration tests for configuration loading

use speed_gate::infra::{Config, DisplayKind, SensorKind};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_config_from_file() {
    let config_content = r#"
[site]
id = "hallway"

[gates]
distance_m = 1.30
threshold_m = 0.30
debounce_ms = 40

[timing]
min_valid_dt_s = 0.05
poll_interval_ms = 10
clear_poll_interval_ms = 25
startup_clear_poll_ms = 100

[speed]
slow_max_kmh = 10.0
normal_max_kmh = 30.0

[sensors]
kind = "simulated"
a_device = "/dev/ttyS1"
b_device = "/dev/ttyS2"
baud = 115200
max_distance_m = 2.0
stale_timeout_ms = 500

[simulation]
speed_kmh = 25.0
period_ms = 2000
occlusion_ms = 80

[display]
kind = "serial_lcd"
device = "/dev/ttyS3"
baud = 19200
cols = 20

[alert]
enabled = false

[egress]
file = "/var/log/speed-gate/passes.jsonl"

[mqtt]
enabled = true
host = "broker.local"
port = 1884
username = "gate"
password = "secret"
passes_topic = "hall/passes"

[metrics]
interval_secs = 15
"#;
    let temp_file = write_config(config_content);

    let config = Config::load_from_path(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "hallway");
    assert_eq!(config.gate_distance_m(), 1.30);
    assert_eq!(config.gate_threshold_m(), 0.30);
    assert_eq!(config.gate_debounce(), Duration::from_millis(40));
    assert_eq!(config.min_valid_dt(), Duration::from_millis(50));
    assert_eq!(config.poll_interval(), Duration::from_millis(10));
    assert_eq!(config.clear_poll_interval(), Duration::from_millis(25));
    assert_eq!(config.startup_clear_poll(), Duration::from_millis(100));
    assert_eq!(config.speed_thresholds().slow_max_kmh, 10.0);
    assert_eq!(config.speed_thresholds().normal_max_kmh, 30.0);
    assert_eq!(config.sensor_kind(), SensorKind::Simulated);
    assert_eq!(config.sensor_a_device(), "/dev/ttyS1");
    assert_eq!(config.sensor_b_device(), "/dev/ttyS2");
    assert_eq!(config.sensor_baud(), 115200);
    assert_eq!(config.sensor_max_distance_m(), 2.0);
    assert_eq!(config.sensor_stale_timeout(), Duration::from_millis(500));
    assert_eq!(config.sim_speed_kmh(), 25.0);
    assert_eq!(config.sim_period(), Duration::from_millis(2000));
    assert_eq!(config.sim_occlusion(), Duration::from_millis(80));
    assert_eq!(config.display_kind(), DisplayKind::SerialLcd);
    assert_eq!(config.display_device(), "/dev/ttyS3");
    assert_eq!(config.display_baud(), 19200);
    assert_eq!(config.display_cols(), 20);
    assert!(!config.alert_enabled());
    assert_eq!(config.egress_file(), Some("/var/log/speed-gate/passes.jsonl"));
    assert!(config.mqtt_enabled());
    assert_eq!(config.mqtt_host(), "broker.local");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.mqtt_username(), Some("gate"));
    assert_eq!(config.mqtt_password(), Some("secret"));
    assert_eq!(config.mqtt_passes_topic(), "hall/passes");
    // Unset topics keep their defaults
    assert_eq!(config.mqtt_alerts_topic(), "speedgate/alerts");
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_partial_config_keeps_defaults() {
    let temp_file = write_config("[gates]\ndistance_m = 0.80\n");

    let config = Config::load_from_path(temp_file.path()).unwrap();

    assert_eq!(config.gate_distance_m(), 0.80);
    assert_eq!(config.gate_threshold_m(), 0.25);
    assert_eq!(config.min_valid_dt(), Duration::from_millis(30));
    assert_eq!(config.speed_thresholds().slow_max_kmh, 20.0);
    assert_eq!(config.sensor_kind(), SensorKind::Serial);
    assert_eq!(config.display_kind(), DisplayKind::Console);
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml").unwrap();
    assert_eq!(config.config_file(), "default");
    assert_eq!(config.gate_distance_m(), 0.40);
    assert_eq!(config.mqtt_host(), "localhost");
    assert_eq!(config.mqtt_port(), 1883);
}

#[test]
fn test_invalid_band_order_is_fatal() {
    let temp_file = write_config("[speed]\nslow_max_kmh = 50.0\nnormal_max_kmh = 20.0\n");

    let err = Config::load_from_path(temp_file.path()).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("Invalid configuration"), "{message}");
    assert!(message.contains("normal_max_kmh"), "{message}");
}

#[test]
fn test_negative_distance_is_fatal() {
    let temp_file = write_config("[gates]\ndistance_m = -0.4\n");

    let err = Config::load_from_path(temp_file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("gates.distance_m must be > 0"));
}

#[test]
fn test_huge_noise_floor_is_fatal() {
    let temp_file = write_config("[timing]\nmin_valid_dt_s = 1e30\n");

    let err = Config::load_from_path(temp_file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("timing.min_valid_dt_s is out of range"));
}

#[test]
fn test_zero_poll_interval_is_fatal() {
    let temp_file = write_config("[timing]\npoll_interval_ms = 0\n");

    let err = Config::load_from_path(temp_file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("timing.poll_interval_ms"));
}

#[test]
fn test_unparseable_file_is_fatal() {
    let temp_file = write_config("[gates\ndistance_m = ");

    let err = Config::load_from_path(temp_file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn test_unknown_sensor_kind_is_fatal() {
    let temp_file = write_config("[sensors]\nkind = \"lidar\"\n");
    assert!(Config::load_from_path(temp_file.path()).is_err());
}

#[test]
fn test_from_file_does_not_validate() {
    let temp_file = write_config("[gates]\ndistance_m = 0.0\n");

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.gate_distance_m(), 0.0);
    assert!(config.validate().is_err());
}

#[test]
fn test_simulate_override() {
    let config = Config::default().with_simulated_sensors();
    assert_eq!(config.sensor_kind(), SensorKind::Simulated);
    assert!(config.validate().is_ok());
}

#[test]
fn test_shipped_dev_config_matches_defaults() {
    let config = Config::load_from_path("config/dev.toml").unwrap();
    let defaults = Config::default();

    assert_eq!(config.gate_distance_m(), defaults.gate_distance_m());
    assert_eq!(config.gate_threshold_m(), defaults.gate_threshold_m());
    assert_eq!(config.min_valid_dt(), defaults.min_valid_dt());
    assert_eq!(config.poll_interval(), defaults.poll_interval());
    assert_eq!(config.speed_thresholds(), defaults.speed_thresholds());
    assert_eq!(config.sensor_kind(), defaults.sensor_kind());
    assert_eq!(config.display_kind(), defaults.display_kind());
    assert_eq!(config.egress_file(), defaults.egress_file());
    assert_eq!(config.mqtt_enabled(), defaults.mqtt_enabled());
}

#[test]
fn test_shipped_sim_config_is_valid() {
    let config = Config::load_from_path("config/sim.toml").unwrap();
    assert_eq!(config.sensor_kind(), SensorKind::Simulated);
    assert_eq!(config.poll_interval(), Duration::from_millis(5));
}
