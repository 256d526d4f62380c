//! Vehicle passage watch
//!
//! Runs while the barrier is open. A sample inside the presence threshold
//! marks the vehicle as entered; once entered, the first sample outside the
//! threshold (or with no echo) marks it as cleared. The watch is bounded by
//! its budget whether or not anything is ever seen.

use crate::domain::types::{DisplayLines, LaneId, LaneState, PassageOutcome};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::display::SharedDisplay;
use crate::io::sensor::DistanceSensor;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct PassageSettings {
    pub sample_interval: Duration,
    pub budget: Duration,
    pub presence_threshold_cm: f32,
}

impl Default for PassageSettings {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(200),
            budget: Duration::from_millis(15_000),
            presence_threshold_cm: 20.0,
        }
    }
}

impl PassageSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sample_interval: Duration::from_millis(config.passage_sample_interval_ms()),
            budget: Duration::from_millis(config.passage_budget_ms()),
            presence_threshold_cm: config.presence_threshold_cm(),
        }
    }
}

pub struct VehiclePassageMonitor {
    sensor: Arc<dyn DistanceSensor>,
    display: SharedDisplay,
    metrics: Arc<Metrics>,
    settings: PassageSettings,
}

impl VehiclePassageMonitor {
    pub fn new(
        sensor: Arc<dyn DistanceSensor>,
        display: SharedDisplay,
        metrics: Arc<Metrics>,
        settings: PassageSettings,
    ) -> Self {
        Self { sensor, display, metrics, settings }
    }

    pub async fn watch_until_cleared(&self, lane: LaneId) -> PassageOutcome {
        let start = Instant::now();
        let deadline = start + self.settings.budget;
        let threshold = self.settings.presence_threshold_cm;
        let mut detected = false;

        while Instant::now() < deadline {
            let sample = self.sensor.sample().await;

            if sample.within(threshold) {
                if !detected {
                    detected = true;
                    self.metrics.record_vehicle_detected();
                    info!(lane = %lane, distance_cm = %sample.distance_cm, "vehicle_entered");
                    self.display
                        .show(
                            lane,
                            LaneState::MonitoringPassage,
                            DisplayLines::new("Vehicle passing", "Please wait..."),
                        )
                        .await;
                }
            } else if detected {
                info!(
                    lane = %lane,
                    distance_cm = %sample.distance_cm,
                    valid = %sample.valid,
                    elapsed_ms = %start.elapsed().as_millis(),
                    "vehicle_cleared"
                );
                self.display
                    .show(
                        lane,
                        LaneState::MonitoringPassage,
                        DisplayLines::new("Vehicle passed", "Closing gate"),
                    )
                    .await;
                return PassageOutcome::ClearedNormally;
            } else {
                debug!(lane = %lane, distance_cm = %sample.distance_cm, "passage_sample_empty");
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.settings.sample_interval.min(remaining)).await;
        }

        warn!(lane = %lane, detected = %detected, "passage_watch_timeout");
        PassageOutcome::TimedOut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::VehiclePresenceSample;
    use crate::testing::{at_cm, RecordingDisplay, ScriptedSensor};

    fn monitor(sensor: Arc<ScriptedSensor>, display: &RecordingDisplay) -> VehiclePassageMonitor {
        VehiclePassageMonitor::new(
            sensor,
            display.shared(),
            Arc::new(Metrics::new()),
            PassageSettings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_vehicle_enters_then_clears() {
        let sensor = Arc::new(ScriptedSensor::new([
            VehiclePresenceSample::no_echo(),
            at_cm(45.0),
            at_cm(12.0),
            at_cm(8.0),
            at_cm(35.0),
        ]));
        let display = RecordingDisplay::default();
        let monitor = monitor(sensor.clone(), &display);

        let start = Instant::now();
        assert_eq!(monitor.watch_until_cleared(LaneId(1)).await, PassageOutcome::ClearedNormally);

        assert_eq!(sensor.taken(), 5);
        assert_eq!(start.elapsed(), Duration::from_millis(800));
        assert_eq!(display.primaries(), vec!["Vehicle passing", "Vehicle passed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_echo_after_entry_counts_as_cleared() {
        let sensor = Arc::new(ScriptedSensor::new([at_cm(10.0), VehiclePresenceSample::no_echo()]));
        let display = RecordingDisplay::default();
        let monitor = monitor(sensor, &display);

        assert_eq!(monitor.watch_until_cleared(LaneId(2)).await, PassageOutcome::ClearedNormally);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_detected_times_out_within_budget() {
        let sensor = Arc::new(ScriptedSensor::default());
        let display = RecordingDisplay::default();
        let monitor = monitor(sensor.clone(), &display);

        let start = Instant::now();
        assert_eq!(monitor.watch_until_cleared(LaneId(1)).await, PassageOutcome::TimedOut);
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(15_000));
        assert!(elapsed <= Duration::from_millis(15_200));
        assert_eq!(sensor.taken(), 75);
        assert!(display.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_vehicle_parked_under_sensor_times_out() {
        let sensor = Arc::new(ScriptedSensor::new(vec![at_cm(5.0); 200]));
        let display = RecordingDisplay::default();
        let monitor = monitor(sensor, &display);

        assert_eq!(monitor.watch_until_cleared(LaneId(1)).await, PassageOutcome::TimedOut);
        assert_eq!(display.primaries(), vec!["Vehicle passing"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_boundary_is_not_presence() {
        let sensor = Arc::new(ScriptedSensor::new([at_cm(20.0), at_cm(19.9), at_cm(20.0)]));
        let display = RecordingDisplay::default();
        let monitor = monitor(sensor.clone(), &display);

        assert_eq!(monitor.watch_until_cleared(LaneId(1)).await, PassageOutcome::ClearedNormally);
        assert_eq!(sensor.taken(), 3);
    }
}
