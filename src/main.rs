//! Lane gate controller
//!
//! Reads credentials at each lane, asks the parking backend for a verdict,
//! and drives the lane barrier: open on grant or confirmed payment, close
//! once the vehicle has passed or the watch times out.
//!
//! Module structure:
//! - `domain/` - Core types (credentials, verdicts, lane states)
//! - `io/` - External interfaces (backend, readers, relays, sensor, display)
//! - `services/` - Lane logic (state machine, payment polling, passage watch)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use lanegate::domain::types::LaneId;
use lanegate::infra::{BarrierMode, BuzzerMode, Config, DisplayMode, Metrics, SensorMode};
use lanegate::io::{
    create_status_channel, start_reader_listener, AbsentSensor, AlwaysOnline, BarrierActuator,
    Buzzer, DistanceSensor, EchoDistanceSensor, HttpBackend, HttpRelayBarrier, LinkStateMonitor,
    LogDisplay, MqttDisplay, MqttStatusPublisher, NetworkMonitor, RelayBuzzer, RelayClient,
    SerialCredentialReader, SerialEchoSource, SharedDisplay, SilentBuzzer, SimulatedBarrier,
    StatusDisplay,
};
use lanegate::services::{create_lane_worker, LaneCollaborators, LaneController, LaneSettings};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Queued reads per lane before further reads are dropped as "lane busy"
const LANE_READ_BUFFER: usize = 4;

/// Lane gate controller - RFID access control for vehicle barriers
#[derive(Parser, Debug)]
#[command(name = "lanegate", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

fn build_sensor(config: &Config) -> Arc<dyn DistanceSensor> {
    match config.sensor_mode() {
        SensorMode::Serial => {
            match SerialEchoSource::open(config.sensor_device(), config.sensor_baud()) {
                Ok(source) => {
                    info!(device = %config.sensor_device(), "distance_sensor_opened");
                    Arc::new(EchoDistanceSensor::new(
                        source,
                        Duration::from_millis(config.echo_timeout_ms()),
                    ))
                }
                Err(e) => {
                    error!(
                        device = %config.sensor_device(),
                        error = %e,
                        "distance_sensor_open_failed: barriers will close on watch timeout"
                    );
                    Arc::new(AbsentSensor)
                }
            }
        }
        SensorMode::None => Arc::new(AbsentSensor),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(revision = %env!("GIT_HASH"), "lanegate starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        backend_url = %config.backend_url(),
        lanes = ?config.lane_ids(),
        sensor_mode = ?config.sensor_mode(),
        display_mode = ?config.display_mode(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());
    metrics.set_lanes(&config.lane_ids());

    // Connectivity preflight for backend calls
    let network: Arc<dyn NetworkMonitor> = match config.network_interface() {
        Some(iface) => Arc::new(LinkStateMonitor::new(iface)),
        None => Arc::new(AlwaysOnline),
    };
    let backend = Arc::new(HttpBackend::new(&config, network, metrics.clone())?);

    // Status display shared by all lanes
    let sink: Box<dyn StatusDisplay> = match config.display_mode() {
        DisplayMode::Log => Box::new(LogDisplay),
        DisplayMode::Mqtt => {
            let (status_tx, status_rx) = create_status_channel(256);
            let publisher = MqttStatusPublisher::new(&config, status_rx);
            let publisher_shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                publisher.run(publisher_shutdown).await;
            });
            Box::new(MqttDisplay::new(config.site_id(), status_tx, metrics.clone()))
        }
    };
    let display = SharedDisplay::new(sink);

    let relay = Arc::new(RelayClient::new(Duration::from_millis(config.relay_timeout_ms()))?);
    let buzzer: Arc<dyn Buzzer> = match config.buzzer().mode {
        BuzzerMode::Relay => Arc::new(RelayBuzzer::new(config.buzzer(), relay.clone())),
        BuzzerMode::Silent => Arc::new(SilentBuzzer),
    };
    let sensor = build_sensor(&config);
    let settings = LaneSettings::from_config(&config);

    // One worker per lane
    let mut lane_senders: HashMap<LaneId, _> = HashMap::new();
    let mut workers = Vec::new();
    for lane in config.lanes() {
        let barrier: Arc<dyn BarrierActuator> = match lane.barrier_mode {
            BarrierMode::Http => Arc::new(HttpRelayBarrier::new(
                lane.id,
                &lane.open_url,
                &lane.close_url,
                relay.clone(),
                metrics.clone(),
            )),
            BarrierMode::Simulated => Arc::new(SimulatedBarrier::new(lane.id)),
        };

        let controller = LaneController::new(
            lane.id,
            LaneCollaborators {
                backend: backend.clone(),
                barrier,
                buzzer: buzzer.clone(),
                sensor: sensor.clone(),
                display: display.clone(),
                metrics: metrics.clone(),
            },
            settings,
        );
        let (read_tx, worker) = create_lane_worker(
            controller,
            Duration::from_millis(config.debounce_ms()),
            metrics.clone(),
            LANE_READ_BUFFER,
        );

        if let Some(device) = &lane.reader_device {
            let reader = SerialCredentialReader::new(
                lane.id,
                device,
                lane.reader_baud,
                read_tx.clone(),
                metrics.clone(),
            );
            let reader_shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                reader.run(reader_shutdown).await;
            });
        } else if !config.reader_listener_enabled() {
            warn!(lane = %lane.id, "lane_has_no_reader");
        }

        lane_senders.insert(lane.id, read_tx);
        let worker_shutdown = shutdown_rx.clone();
        workers.push(tokio::spawn(async move {
            worker.run(worker_shutdown).await;
        }));
    }

    // Start TCP credential listener (bench and simulation input)
    if config.reader_listener_enabled() {
        let port = config.reader_listener_port();
        let listener_metrics = metrics.clone();
        let listener_shutdown = shutdown_rx.clone();
        let senders = lane_senders.clone();
        tokio::spawn(async move {
            if let Err(e) =
                start_reader_listener(port, senders, listener_metrics, listener_shutdown).await
            {
                error!(error = %e, "reader listener error");
            }
        });
    }
    drop(lane_senders);

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = lanegate::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Lanes finish their current episode before stopping
    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "lane worker panicked");
        }
    }

    metrics.report().log();
    info!("lanegate shutdown complete");
    Ok(())
}
