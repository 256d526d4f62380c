//! Integration tests for configuration loading

use lanegate::domain::types::LaneId;
use lanegate::infra::{BarrierMode, BuzzerMode, Config, DisplayMode, SensorMode};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_config_from_file() {
    let temp_file = write_config(
        r#"
[site]
id = "test-site"

[backend]
url = "http://10.0.0.5:8080/api/esp32/uid"
timeout_ms = 4000

[network]
interface = "wlan0"

[payment]
poll_interval_ms = 2000
budget_ms = 30000

[passage]
budget_ms = 10000
presence_threshold_cm = 35.5

[timing]
debounce_ms = 1500

[sensor]
mode = "serial"
device = "/dev/ttyS3"

[display]
mode = "mqtt"

[mqtt]
host = "broker"
port = 1884
status_topic = "site/status"

[buzzer]
mode = "relay"
on_url = "http://relay/3/on"
off_url = "http://relay/3/off"

[metrics]
interval_secs = 15
prometheus_port = 9091

[[lanes]]
id = 1
reader_device = "/dev/ttyUSB0"
barrier_mode = "http"
open_url = "http://relay/0/on"
close_url = "http://relay/0/off"

[[lanes]]
id = 2
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "test-site");
    assert_eq!(config.backend_url(), "http://10.0.0.5:8080/api/esp32/uid");
    assert_eq!(config.backend_timeout_ms(), 4000);
    assert_eq!(config.network_interface(), Some("wlan0"));
    assert_eq!(config.poll_interval_ms(), 2000);
    assert_eq!(config.poll_budget_ms(), 30_000);
    assert_eq!(config.poll_tick_ms(), 100);
    assert_eq!(config.passage_budget_ms(), 10_000);
    assert_eq!(config.passage_sample_interval_ms(), 200);
    assert_eq!(config.presence_threshold_cm(), 35.5);
    assert_eq!(config.debounce_ms(), 1500);
    assert_eq!(config.error_cooldown_ms(), 3000);
    assert_eq!(config.sensor_mode(), SensorMode::Serial);
    assert_eq!(config.sensor_device(), "/dev/ttyS3");
    assert_eq!(config.display_mode(), DisplayMode::Mqtt);
    assert_eq!(config.mqtt_host(), "broker");
    assert_eq!(config.mqtt_status_topic(), "site/status");
    assert_eq!(config.buzzer().mode, BuzzerMode::Relay);
    assert_eq!(config.prometheus_port(), 9091);

    assert_eq!(config.lane_ids(), vec![LaneId(1), LaneId(2)]);
    let lanes = config.lanes();
    assert_eq!(lanes[0].reader_device.as_deref(), Some("/dev/ttyUSB0"));
    assert_eq!(lanes[0].barrier_mode, BarrierMode::Http);
    assert_eq!(lanes[1].barrier_mode, BarrierMode::Simulated);
    assert_eq!(lanes[1].reader_device, None);
}

#[test]
fn test_minimal_config_uses_defaults() {
    let temp_file = write_config(
        r#"
[backend]
url = "http://backend/api/esp32/uid"

[[lanes]]
id = 1
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.backend_timeout_ms(), 5000);
    assert_eq!(config.poll_interval_ms(), 3000);
    assert_eq!(config.poll_budget_ms(), 60_000);
    assert_eq!(config.passage_budget_ms(), 15_000);
    assert_eq!(config.network_interface(), None);
    assert_eq!(config.sensor_mode(), SensorMode::None);
    assert_eq!(config.display_mode(), DisplayMode::Log);
    assert_eq!(config.buzzer().mode, BuzzerMode::Silent);
    assert!(!config.reader_listener_enabled());
}

#[test]
fn test_http_barrier_without_urls_rejected() {
    let temp_file = write_config(
        r#"
[backend]
url = "http://backend/api/esp32/uid"

[[lanes]]
id = 1
barrier_mode = "http"
open_url = "http://relay/0/on"
"#,
    );

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("open_url/close_url"));
}

#[test]
fn test_config_without_lanes_rejected() {
    let temp_file = write_config(
        r#"
lanes = []

[backend]
url = "http://backend/api/esp32/uid"
"#,
    );

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_zero_tick_rejected() {
    let temp_file = write_config(
        r#"
[backend]
url = "http://backend/api/esp32/uid"

[payment]
tick_ms = 0

[[lanes]]
id = 1
"#,
    );

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("payment.tick_ms must be greater than zero"));
}

#[test]
fn test_sample_interval_longer_than_budget_rejected() {
    let temp_file = write_config(
        r#"
[backend]
url = "http://backend/api/esp32/uid"

[passage]
sample_interval_ms = 20000
budget_ms = 15000

[[lanes]]
id = 1
"#,
    );

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("passage.sample_interval_ms (20000) exceeds"));
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.config_file(), "default");
    assert_eq!(config.backend_url(), "http://localhost:8080/api/esp32/uid");
    assert_eq!(config.lane_ids(), vec![LaneId(1), LaneId(2)]);
}

#[test]
fn test_bundled_dev_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.toml");
    let config = Config::from_file(path).unwrap();
    assert!(config.reader_listener_enabled());
    assert_eq!(config.lane_ids(), vec![LaneId(1), LaneId(2)]);
}
