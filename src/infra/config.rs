//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. Default: config/dev.toml
//!
//! A missing or unparsable file falls back to built-in defaults.

use crate::domain::types::LaneId;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarrierMode {
    Http,
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorMode {
    Serial,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Log,
    Mqtt,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuzzerMode {
    Relay,
    Silent,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "north-lot")
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "lanegate".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Authorization endpoint; the payment poll path is derived from its parent
    pub url: String,
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_backend_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NetworkConfig {
    /// Interface whose link state gates backend calls (e.g., "wlan0").
    /// Unset means the network is assumed available.
    #[serde(default)]
    pub interface: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_budget_ms")]
    pub budget_ms: u64,
    /// Wake-up cadence between polls
    #[serde(default = "default_poll_tick_ms")]
    pub tick_ms: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            budget_ms: default_poll_budget_ms(),
            tick_ms: default_poll_tick_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_poll_budget_ms() -> u64 {
    60_000
}

fn default_poll_tick_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct PassageConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_passage_budget_ms")]
    pub budget_ms: u64,
    #[serde(default = "default_presence_threshold_cm")]
    pub presence_threshold_cm: f32,
}

impl Default for PassageConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            budget_ms: default_passage_budget_ms(),
            presence_threshold_cm: default_presence_threshold_cm(),
        }
    }
}

fn default_sample_interval_ms() -> u64 {
    200
}

fn default_passage_budget_ms() -> u64 {
    15_000
}

fn default_presence_threshold_cm() -> f32 {
    20.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Minimum interval before the same credential is admitted again
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Message hold time after a denial or error
    #[serde(default = "default_error_cooldown_ms")]
    pub error_cooldown_ms: u64,
    /// Message hold time after the barrier closes
    #[serde(default = "default_passage_cooldown_ms")]
    pub passage_cooldown_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            error_cooldown_ms: default_error_cooldown_ms(),
            passage_cooldown_ms: default_passage_cooldown_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_error_cooldown_ms() -> u64 {
    3000
}

fn default_passage_cooldown_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_sensor_mode")]
    pub mode: SensorMode,
    #[serde(default = "default_sensor_device")]
    pub device: String,
    #[serde(default = "default_sensor_baud")]
    pub baud: u32,
    #[serde(default = "default_echo_timeout_ms")]
    pub echo_timeout_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            mode: default_sensor_mode(),
            device: default_sensor_device(),
            baud: default_sensor_baud(),
            echo_timeout_ms: default_echo_timeout_ms(),
        }
    }
}

fn default_sensor_mode() -> SensorMode {
    SensorMode::None
}

fn default_sensor_device() -> String {
    "/dev/ttyAMA2".to_string()
}

fn default_sensor_baud() -> u32 {
    9600
}

fn default_echo_timeout_ms() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_display_mode")]
    pub mode: DisplayMode,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { mode: default_display_mode() }
    }
}

fn default_display_mode() -> DisplayMode {
    DisplayMode::Log
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Topic for lane status updates (QoS 0)
    #[serde(default = "default_status_topic")]
    pub status_topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            status_topic: default_status_topic(),
            username: None,
            password: None,
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_status_topic() -> String {
    "lanegate/status".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuzzerConfig {
    #[serde(default = "default_buzzer_mode")]
    pub mode: BuzzerMode,
    #[serde(default)]
    pub on_url: String,
    #[serde(default)]
    pub off_url: String,
    #[serde(default = "default_buzzer_pulses")]
    pub pulses: u32,
    #[serde(default = "default_buzzer_pulse_ms")]
    pub pulse_ms: u64,
}

impl Default for BuzzerConfig {
    fn default() -> Self {
        Self {
            mode: default_buzzer_mode(),
            on_url: String::new(),
            off_url: String::new(),
            pulses: default_buzzer_pulses(),
            pulse_ms: default_buzzer_pulse_ms(),
        }
    }
}

fn default_buzzer_mode() -> BuzzerMode {
    BuzzerMode::Silent
}

fn default_buzzer_pulses() -> u32 {
    2
}

fn default_buzzer_pulse_ms() -> u64 {
    200
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { timeout_ms: default_relay_timeout_ms() }
    }
}

fn default_relay_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaderListenerConfig {
    /// Enable the `CARD <lane> <uid>` TCP listener
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_reader_listener_port")]
    pub port: u16,
}

impl Default for ReaderListenerConfig {
    fn default() -> Self {
        Self { enabled: false, port: default_reader_listener_port() }
    }
}

fn default_reader_listener_port() -> u16 {
    25900
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_metrics_interval_secs(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

fn default_metrics_interval_secs() -> u64 {
    30
}

fn default_prometheus_port() -> u16 {
    9090
}

/// One physical lane: reader, barrier and its relay URLs
#[derive(Debug, Clone, Deserialize)]
pub struct LaneConfig {
    pub id: LaneId,
    /// Serial device of the lane's credential reader (one UID per line)
    #[serde(default)]
    pub reader_device: Option<String>,
    #[serde(default = "default_reader_baud")]
    pub reader_baud: u32,
    #[serde(default = "default_barrier_mode")]
    pub barrier_mode: BarrierMode,
    #[serde(default)]
    pub open_url: String,
    #[serde(default)]
    pub close_url: String,
}

impl LaneConfig {
    pub fn simulated(id: u8) -> Self {
        Self {
            id: LaneId(id),
            reader_device: None,
            reader_baud: default_reader_baud(),
            barrier_mode: BarrierMode::Simulated,
            open_url: String::new(),
            close_url: String::new(),
        }
    }
}

fn default_reader_baud() -> u32 {
    9600
}

fn default_barrier_mode() -> BarrierMode {
    BarrierMode::Simulated
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub passage: PassageConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub buzzer: BuzzerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub reader_listener: ReaderListenerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub lanes: Vec<LaneConfig>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    backend_url: String,
    backend_timeout_ms: u64,
    network_interface: Option<String>,
    poll_interval_ms: u64,
    poll_budget_ms: u64,
    poll_tick_ms: u64,
    passage_sample_interval_ms: u64,
    passage_budget_ms: u64,
    presence_threshold_cm: f32,
    debounce_ms: u64,
    error_cooldown_ms: u64,
    passage_cooldown_ms: u64,
    sensor_mode: SensorMode,
    sensor_device: String,
    sensor_baud: u32,
    echo_timeout_ms: u64,
    display_mode: DisplayMode,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_status_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    buzzer: BuzzerConfig,
    relay_timeout_ms: u64,
    reader_listener_enabled: bool,
    reader_listener_port: u16,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    lanes: Vec<LaneConfig>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            backend_url: "http://localhost:8080/api/esp32/uid".to_string(),
            backend_timeout_ms: default_backend_timeout_ms(),
            network_interface: None,
            poll_interval_ms: default_poll_interval_ms(),
            poll_budget_ms: default_poll_budget_ms(),
            poll_tick_ms: default_poll_tick_ms(),
            passage_sample_interval_ms: default_sample_interval_ms(),
            passage_budget_ms: default_passage_budget_ms(),
            presence_threshold_cm: default_presence_threshold_cm(),
            debounce_ms: default_debounce_ms(),
            error_cooldown_ms: default_error_cooldown_ms(),
            passage_cooldown_ms: default_passage_cooldown_ms(),
            sensor_mode: default_sensor_mode(),
            sensor_device: default_sensor_device(),
            sensor_baud: default_sensor_baud(),
            echo_timeout_ms: default_echo_timeout_ms(),
            display_mode: default_display_mode(),
            mqtt_host: default_mqtt_host(),
            mqtt_port: default_mqtt_port(),
            mqtt_status_topic: default_status_topic(),
            mqtt_username: None,
            mqtt_password: None,
            buzzer: BuzzerConfig::default(),
            relay_timeout_ms: default_relay_timeout_ms(),
            reader_listener_enabled: false,
            reader_listener_port: default_reader_listener_port(),
            metrics_interval_secs: default_metrics_interval_secs(),
            prometheus_port: default_prometheus_port(),
            lanes: vec![LaneConfig::simulated(1), LaneConfig::simulated(2)],
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Self::validate_lanes(&toml_config.lanes)
            .with_context(|| format!("Invalid lanes in config file {}", path.display()))?;
        Self::validate_timings(&toml_config.backend, &toml_config.payment, &toml_config.passage)
            .with_context(|| format!("Invalid timings in config file {}", path.display()))?;

        Ok(Self {
            site_id: toml_config.site.id,
            backend_url: toml_config.backend.url,
            backend_timeout_ms: toml_config.backend.timeout_ms,
            network_interface: toml_config.network.interface,
            poll_interval_ms: toml_config.payment.poll_interval_ms,
            poll_budget_ms: toml_config.payment.budget_ms,
            poll_tick_ms: toml_config.payment.tick_ms,
            passage_sample_interval_ms: toml_config.passage.sample_interval_ms,
            passage_budget_ms: toml_config.passage.budget_ms,
            presence_threshold_cm: toml_config.passage.presence_threshold_cm,
            debounce_ms: toml_config.timing.debounce_ms,
            error_cooldown_ms: toml_config.timing.error_cooldown_ms,
            passage_cooldown_ms: toml_config.timing.passage_cooldown_ms,
            sensor_mode: toml_config.sensor.mode,
            sensor_device: toml_config.sensor.device,
            sensor_baud: toml_config.sensor.baud,
            echo_timeout_ms: toml_config.sensor.echo_timeout_ms,
            display_mode: toml_config.display.mode,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_status_topic: toml_config.mqtt.status_topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            buzzer: toml_config.buzzer,
            relay_timeout_ms: toml_config.relay.timeout_ms,
            reader_listener_enabled: toml_config.reader_listener.enabled,
            reader_listener_port: toml_config.reader_listener.port,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            lanes: toml_config.lanes,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    fn validate_lanes(lanes: &[LaneConfig]) -> anyhow::Result<()> {
        if lanes.is_empty() {
            anyhow::bail!("at least one [[lanes]] entry is required");
        }
        for (i, lane) in lanes.iter().enumerate() {
            if lane.id.0 == 0 {
                anyhow::bail!("lane ids are 1-based");
            }
            if lanes[..i].iter().any(|other| other.id == lane.id) {
                anyhow::bail!("duplicate lane id {}", lane.id);
            }
            if lane.barrier_mode == BarrierMode::Http
                && (lane.open_url.is_empty() || lane.close_url.is_empty())
            {
                anyhow::bail!("lane {} uses http barrier without open_url/close_url", lane.id);
            }
        }
        Ok(())
    }

    /// Zero periods would spin the lane loops; an interval longer than its
    /// budget never fires.
    fn validate_timings(
        backend: &BackendConfig,
        payment: &PaymentConfig,
        passage: &PassageConfig,
    ) -> anyhow::Result<()> {
        let nonzero = [
            ("backend.timeout_ms", backend.timeout_ms),
            ("payment.poll_interval_ms", payment.poll_interval_ms),
            ("payment.budget_ms", payment.budget_ms),
            ("payment.tick_ms", payment.tick_ms),
            ("passage.sample_interval_ms", passage.sample_interval_ms),
            ("passage.budget_ms", passage.budget_ms),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }
        if payment.poll_interval_ms > payment.budget_ms {
            anyhow::bail!(
                "payment.poll_interval_ms ({}) exceeds payment.budget_ms ({})",
                payment.poll_interval_ms,
                payment.budget_ms
            );
        }
        if passage.sample_interval_ms > passage.budget_ms {
            anyhow::bail!(
                "passage.sample_interval_ms ({}) exceeds passage.budget_ms ({})",
                passage.sample_interval_ms,
                passage.budget_ms
            );
        }
        Ok(())
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    pub fn backend_timeout_ms(&self) -> u64 {
        self.backend_timeout_ms
    }

    pub fn network_interface(&self) -> Option<&str> {
        self.network_interface.as_deref()
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn poll_budget_ms(&self) -> u64 {
        self.poll_budget_ms
    }

    pub fn poll_tick_ms(&self) -> u64 {
        self.poll_tick_ms
    }

    pub fn passage_sample_interval_ms(&self) -> u64 {
        self.passage_sample_interval_ms
    }

    pub fn passage_budget_ms(&self) -> u64 {
        self.passage_budget_ms
    }

    pub fn presence_threshold_cm(&self) -> f32 {
        self.presence_threshold_cm
    }

    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms
    }

    pub fn error_cooldown_ms(&self) -> u64 {
        self.error_cooldown_ms
    }

    pub fn passage_cooldown_ms(&self) -> u64 {
        self.passage_cooldown_ms
    }

    pub fn sensor_mode(&self) -> SensorMode {
        self.sensor_mode
    }

    pub fn sensor_device(&self) -> &str {
        &self.sensor_device
    }

    pub fn sensor_baud(&self) -> u32 {
        self.sensor_baud
    }

    pub fn echo_timeout_ms(&self) -> u64 {
        self.echo_timeout_ms
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_status_topic(&self) -> &str {
        &self.mqtt_status_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn buzzer(&self) -> &BuzzerConfig {
        &self.buzzer
    }

    pub fn relay_timeout_ms(&self) -> u64 {
        self.relay_timeout_ms
    }

    pub fn reader_listener_enabled(&self) -> bool {
        self.reader_listener_enabled
    }

    pub fn reader_listener_port(&self) -> u16 {
        self.reader_listener_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn lanes(&self) -> &[LaneConfig] {
        &self.lanes
    }

    pub fn lane_ids(&self) -> Vec<LaneId> {
        self.lanes.iter().map(|lane| lane.id).collect()
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point at a mock backend
    pub fn with_backend_url(mut self, url: &str) -> Self {
        self.backend_url = url.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend_timeout_ms(), 5000);
        assert_eq!(config.poll_interval_ms(), 3000);
        assert_eq!(config.poll_budget_ms(), 60_000);
        assert_eq!(config.passage_sample_interval_ms(), 200);
        assert_eq!(config.passage_budget_ms(), 15_000);
        assert_eq!(config.presence_threshold_cm(), 20.0);
        assert_eq!(config.debounce_ms(), 2000);
        assert_eq!(config.error_cooldown_ms(), 3000);
        assert_eq!(config.passage_cooldown_ms(), 2000);
        assert_eq!(config.echo_timeout_ms(), 30);
        assert_eq!(config.lane_ids(), vec![LaneId(1), LaneId(2)]);
    }

    #[test]
    fn test_validate_rejects_duplicate_lanes() {
        let lanes = vec![LaneConfig::simulated(1), LaneConfig::simulated(1)];
        assert!(Config::validate_lanes(&lanes).is_err());
    }

    fn backend_config() -> BackendConfig {
        BackendConfig { url: "http://localhost/api".to_string(), timeout_ms: 5000 }
    }

    #[test]
    fn test_default_timings_are_valid() {
        let result = Config::validate_timings(
            &backend_config(),
            &PaymentConfig::default(),
            &PassageConfig::default(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let payment = PaymentConfig { tick_ms: 0, ..PaymentConfig::default() };
        let err = Config::validate_timings(&backend_config(), &payment, &PassageConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("payment.tick_ms"));
    }

    #[test]
    fn test_validate_rejects_zero_sample_interval() {
        let passage = PassageConfig { sample_interval_ms: 0, ..PassageConfig::default() };
        assert!(
            Config::validate_timings(&backend_config(), &PaymentConfig::default(), &passage)
                .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_zero_backend_timeout() {
        let backend = BackendConfig { timeout_ms: 0, ..backend_config() };
        assert!(
            Config::validate_timings(&backend, &PaymentConfig::default(), &PassageConfig::default())
                .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_interval_longer_than_budget() {
        let payment = PaymentConfig { poll_interval_ms: 5000, budget_ms: 4000, tick_ms: 100 };
        let err = Config::validate_timings(&backend_config(), &payment, &PassageConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("exceeds payment.budget_ms"));

        let passage = PassageConfig { sample_interval_ms: 500, budget_ms: 400, ..PassageConfig::default() };
        assert!(
            Config::validate_timings(&backend_config(), &PaymentConfig::default(), &passage)
                .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_zero_lane_id() {
        assert!(Config::validate_lanes(&[LaneConfig::simulated(0)]).is_err());
    }

    #[test]
    fn test_validate_requires_relay_urls_for_http_barrier() {
        let mut lane = LaneConfig::simulated(1);
        lane.barrier_mode = BarrierMode::Http;
        lane.open_url = "http://relay/open".to_string();
        assert!(Config::validate_lanes(&[lane.clone()]).is_err());

        lane.close_url = "http://relay/close".to_string();
        assert!(Config::validate_lanes(&[lane]).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_lanes() {
        assert!(Config::validate_lanes(&[]).is_err());
    }

    #[test]
    fn test_with_backend_url() {
        let config = Config::default().with_backend_url("http://127.0.0.1:1/api/esp32/uid");
        assert_eq!(config.backend_url(), "http://127.0.0.1:1/api/esp32/uid");
    }
}
