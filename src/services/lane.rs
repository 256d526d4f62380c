//! Lane access-control state machine
//!
//! One `LaneController` per lane runs one episode per admitted credential:
//!
//! ```text
//! Idle -> Authorizing -> Opening -> MonitoringPassage -> Closing -> Idle
//!              |               ^
//!              +-> AwaitingPayment (confirmed)
//!              |         |
//!              +---------+-> Error -> (cooldown) -> Idle
//! ```
//!
//! The barrier is only opened after a granted verdict or a confirmed
//! payment, and every episode that opens it closes it exactly once. Backend
//! failures never escape: they end the episode in Error with a message and a
//! cooldown. Nothing is retried; the card has to be presented again.

use crate::domain::types::{
    AuthorizationVerdict, BackendError, BarrierPosition, CredentialEvent, CredentialId,
    DisplayLines, EpisodeOutcome, LaneId, LaneState, PassageOutcome,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::backend::GateBackend;
use crate::io::barrier::BarrierActuator;
use crate::io::buzzer::Buzzer;
use crate::io::display::SharedDisplay;
use crate::io::sensor::DistanceSensor;
use crate::services::passage_monitor::{PassageSettings, VehiclePassageMonitor};
use crate::services::payment_poller::{PaymentPoller, PollerSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Lines shown while a lane waits for a card
pub fn idle_lines() -> DisplayLines {
    DisplayLines::new("Ready to scan", "RFID cards...")
}

/// Lines shown when an authorization attempt fails before a verdict
fn error_lines(err: &BackendError) -> DisplayLines {
    match err {
        BackendError::NetworkUnavailable => DisplayLines::new("WiFi Error", "Check connection"),
        BackendError::TransportFailure { status: Some(code), .. } => {
            DisplayLines::new("HTTP Error", format!("Code: {code}"))
        }
        BackendError::TransportFailure { status: None, .. } => {
            DisplayLines::new("HTTP Error", "Request failed")
        }
        BackendError::MalformedResponse(_) => DisplayLines::new("Parse Error", "Invalid response"),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LaneTimings {
    /// Hold after a denial or failure before returning to Idle
    pub error_cooldown: Duration,
    /// Hold after the barrier closes behind a passage
    pub passage_cooldown: Duration,
}

impl Default for LaneTimings {
    fn default() -> Self {
        Self {
            error_cooldown: Duration::from_millis(3000),
            passage_cooldown: Duration::from_millis(2000),
        }
    }
}

impl LaneTimings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            error_cooldown: Duration::from_millis(config.error_cooldown_ms()),
            passage_cooldown: Duration::from_millis(config.passage_cooldown_ms()),
        }
    }
}

/// Timing parameters for every stage of an episode
#[derive(Debug, Clone, Copy, Default)]
pub struct LaneSettings {
    pub timings: LaneTimings,
    pub poller: PollerSettings,
    pub passage: PassageSettings,
}

impl LaneSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timings: LaneTimings::from_config(config),
            poller: PollerSettings::from_config(config),
            passage: PassageSettings::from_config(config),
        }
    }
}

/// External collaborators a lane drives
pub struct LaneCollaborators {
    pub backend: Arc<dyn GateBackend>,
    pub barrier: Arc<dyn BarrierActuator>,
    pub buzzer: Arc<dyn Buzzer>,
    pub sensor: Arc<dyn DistanceSensor>,
    pub display: SharedDisplay,
    pub metrics: Arc<Metrics>,
}

/// Summary of one completed episode
#[derive(Debug, Clone)]
pub struct EpisodeReport {
    pub episode_id: Uuid,
    pub lane: LaneId,
    pub credential: CredentialId,
    pub outcome: EpisodeOutcome,
    /// States entered during the episode, in order
    pub states: Vec<LaneState>,
    pub duration: Duration,
}

pub struct LaneController {
    lane: LaneId,
    backend: Arc<dyn GateBackend>,
    barrier: Arc<dyn BarrierActuator>,
    buzzer: Arc<dyn Buzzer>,
    display: SharedDisplay,
    metrics: Arc<Metrics>,
    poller: PaymentPoller,
    monitor: VehiclePassageMonitor,
    timings: LaneTimings,
    state: LaneState,
    barrier_position: BarrierPosition,
    visited: Vec<LaneState>,
}

impl LaneController {
    pub fn new(lane: LaneId, parts: LaneCollaborators, settings: LaneSettings) -> Self {
        let poller = PaymentPoller::new(
            parts.backend.clone(),
            parts.display.clone(),
            parts.metrics.clone(),
            settings.poller,
        );
        let monitor = VehiclePassageMonitor::new(
            parts.sensor,
            parts.display.clone(),
            parts.metrics.clone(),
            settings.passage,
        );

        Self {
            lane,
            backend: parts.backend,
            barrier: parts.barrier,
            buzzer: parts.buzzer,
            display: parts.display,
            metrics: parts.metrics,
            poller,
            monitor,
            timings: settings.timings,
            state: LaneState::Idle,
            barrier_position: BarrierPosition::Closed,
            visited: Vec::new(),
        }
    }

    pub fn lane(&self) -> LaneId {
        self.lane
    }

    pub fn state(&self) -> LaneState {
        self.state
    }

    pub fn barrier_position(&self) -> BarrierPosition {
        self.barrier_position
    }

    /// Bring the lane to a known state: barrier closed, idle prompt shown
    pub async fn reset(&mut self) {
        self.barrier.close().await;
        self.metrics.record_barrier_close();
        self.barrier_position = BarrierPosition::Closed;
        self.state = LaneState::Idle;
        self.metrics.set_lane_state(self.lane, LaneState::Idle);
        self.show(idle_lines()).await;
        info!(lane = %self.lane, "lane_ready");
    }

    /// Run one episode for an admitted credential, from Authorizing back to Idle
    pub async fn handle(&mut self, event: &CredentialEvent) -> EpisodeReport {
        let episode_id = Uuid::now_v7();
        let started = Instant::now();
        self.visited.clear();

        let span = tracing::info_span!("episode", id = %episode_id, lane = %self.lane);
        let outcome = self.run_episode(event).instrument(span).await;

        let duration = started.elapsed();
        self.metrics.record_episode(outcome);
        info!(
            episode = %episode_id,
            lane = %self.lane,
            credential = %event.credential_id(),
            outcome = %outcome.as_str(),
            duration_ms = %duration.as_millis(),
            "episode_complete"
        );

        EpisodeReport {
            episode_id,
            lane: self.lane,
            credential: event.credential_id().clone(),
            outcome,
            states: std::mem::take(&mut self.visited),
            duration,
        }
    }

    async fn run_episode(&mut self, event: &CredentialEvent) -> EpisodeOutcome {
        let credential = event.credential_id();
        info!(
            credential = %credential,
            observed_at = %event.wall_time().to_rfc3339(),
            queue_delay_ms = %event.observed_at().elapsed().as_millis(),
            "credential_accepted"
        );

        self.show(DisplayLines::new(format!("RFID #{}:", self.lane), credential.short())).await;
        self.buzzer.chirp().await;

        self.transition(LaneState::Authorizing, Some(DisplayLines::new("Checking...", "Please wait")))
            .await;

        match self.backend.authorize(self.lane, credential).await {
            Ok(AuthorizationVerdict::Granted(lines)) => {
                info!(credential = %credential, "auth_granted");
                self.show(lines).await;
                self.pass_through().await
            }
            Ok(AuthorizationVerdict::PendingPayment(lines)) => {
                info!(credential = %credential, "auth_pending_payment");
                self.show(lines).await;
                self.transition(LaneState::AwaitingPayment, None).await;
                if self.poller.run(self.lane, credential).await {
                    self.pass_through().await
                } else {
                    self.fail(EpisodeOutcome::PaymentNotConfirmed, None).await
                }
            }
            Ok(AuthorizationVerdict::Denied(lines)) => {
                info!(credential = %credential, reason = %lines.primary, "auth_denied");
                self.show(lines).await;
                self.fail(EpisodeOutcome::Denied, None).await
            }
            Ok(AuthorizationVerdict::Unrecognized { status, display }) => {
                warn!(credential = %credential, status = %status, "auth_unrecognized_status");
                self.show(display).await;
                self.fail(
                    EpisodeOutcome::Unrecognized,
                    Some(DisplayLines::new("Unknown Status", "Try again")),
                )
                .await
            }
            Err(e) => {
                warn!(credential = %credential, error = %e, kind = %e.as_str(), "auth_failed");
                self.fail(EpisodeOutcome::from(&e), Some(error_lines(&e))).await
            }
        }
    }

    /// Open, watch the passage, close. The close is issued on every path.
    async fn pass_through(&mut self) -> EpisodeOutcome {
        self.transition(LaneState::Opening, Some(DisplayLines::new("Gate Opened", "Drive through")))
            .await;
        self.barrier.open().await;
        self.metrics.record_barrier_open();
        self.barrier_position = BarrierPosition::Open;

        self.transition(LaneState::MonitoringPassage, None).await;
        let passage = self.monitor.watch_until_cleared(self.lane).await;

        self.transition(LaneState::Closing, None).await;
        self.barrier.close().await;
        self.metrics.record_barrier_close();
        self.barrier_position = BarrierPosition::Closed;

        let outcome = match passage {
            PassageOutcome::ClearedNormally => EpisodeOutcome::Passed,
            PassageOutcome::TimedOut => {
                self.show(DisplayLines::new("Timeout!", "Gate closed")).await;
                EpisodeOutcome::PassageTimedOut
            }
        };

        tokio::time::sleep(self.timings.passage_cooldown).await;
        self.transition(LaneState::Idle, Some(idle_lines())).await;
        outcome
    }

    /// End the episode without opening: message, cooldown, Idle
    async fn fail(&mut self, outcome: EpisodeOutcome, lines: Option<DisplayLines>) -> EpisodeOutcome {
        self.transition(LaneState::Error, lines).await;
        tokio::time::sleep(self.timings.error_cooldown).await;
        self.transition(LaneState::Idle, Some(idle_lines())).await;
        outcome
    }

    /// Enter `state`. Without new lines the lane keeps whatever it shows
    /// now, including messages put up by the poller or the passage watch.
    async fn transition(&mut self, state: LaneState, lines: Option<DisplayLines>) {
        debug_assert!(
            !(state.requires_closed_barrier() && self.barrier_position == BarrierPosition::Open),
            "barrier open while entering {}",
            state.as_str()
        );
        debug!(from = %self.state.as_str(), to = %state.as_str(), "lane_transition");

        self.state = state;
        self.visited.push(state);
        self.metrics.set_lane_state(self.lane, state);

        match lines {
            Some(lines) => self.show(lines).await,
            None => self.display.restate(self.lane, state).await,
        }
    }

    async fn show(&self, lines: DisplayLines) {
        self.display.show(self.lane, self.state, lines).await;
    }
}
