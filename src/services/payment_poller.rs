//! Deferred-payment confirmation loop
//!
//! After a `pending_payment` verdict the lane polls the gate-command
//! endpoint at a fixed interval until the payment is confirmed, the network
//! drops, or the budget runs out. The first poll goes out immediately.

use crate::domain::types::{BackendError, CredentialId, DisplayLines, LaneId, LaneState, PollOutcome};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::backend::GateBackend;
use crate::io::display::SharedDisplay;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub interval: Duration,
    pub budget: Duration,
    /// Wake-up period for deadline checks between polls
    pub tick: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3000),
            budget: Duration::from_millis(60_000),
            tick: Duration::from_millis(100),
        }
    }
}

impl PollerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms()),
            budget: Duration::from_millis(config.poll_budget_ms()),
            tick: Duration::from_millis(config.poll_tick_ms()),
        }
    }

    /// Upper bound on polls per run: ceil(budget / interval)
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        self.budget.as_millis().div_ceil(interval) as u32
    }
}

pub struct PaymentPoller {
    backend: Arc<dyn GateBackend>,
    display: SharedDisplay,
    metrics: Arc<Metrics>,
    settings: PollerSettings,
}

impl PaymentPoller {
    pub fn new(
        backend: Arc<dyn GateBackend>,
        display: SharedDisplay,
        metrics: Arc<Metrics>,
        settings: PollerSettings,
    ) -> Self {
        Self { backend, display, metrics, settings }
    }

    /// Poll until the payment is confirmed. Returns true to open the gate.
    pub async fn run(&self, lane: LaneId, credential: &CredentialId) -> bool {
        let start = Instant::now();
        let deadline = start + self.settings.budget;
        let max_attempts = self.settings.max_attempts();
        let mut next_poll = start;
        let mut attempts = 0u32;

        info!(lane = %lane, credential = %credential, max_attempts = %max_attempts, "payment_poll_started");
        self.show(lane, DisplayLines::new("Waiting payment", "Please wait...")).await;

        while Instant::now() < deadline {
            let now = Instant::now();
            if now >= next_poll && attempts < max_attempts {
                next_poll = now + self.settings.interval;
                attempts += 1;

                match self.backend.check_gate_command(credential).await {
                    PollOutcome::OpenApproved(reason) => {
                        self.metrics.record_poll_attempt(false);
                        info!(
                            lane = %lane,
                            credential = %credential,
                            reason = %reason,
                            attempts = %attempts,
                            elapsed_ms = %start.elapsed().as_millis(),
                            "payment_confirmed"
                        );
                        self.show(lane, DisplayLines::new("Payment OK!", "Opening gate...")).await;
                        return true;
                    }
                    PollOutcome::StillPending => {
                        self.metrics.record_poll_attempt(false);
                        debug!(lane = %lane, attempt = %attempts, "payment_still_pending");
                    }
                    PollOutcome::PollFailed(BackendError::NetworkUnavailable) => {
                        self.metrics.record_poll_attempt(true);
                        warn!(lane = %lane, attempt = %attempts, "payment_poll_network_lost");
                        break;
                    }
                    PollOutcome::PollFailed(e) => {
                        self.metrics.record_poll_attempt(true);
                        warn!(lane = %lane, attempt = %attempts, error = %e, "payment_poll_failed");
                    }
                }

                let remaining = deadline.saturating_duration_since(Instant::now()).as_secs();
                self.show(lane, DisplayLines::new("Waiting payment", format!("Timeout: {remaining}s")))
                    .await;
            }

            tokio::time::sleep(self.settings.tick).await;
        }

        info!(
            lane = %lane,
            credential = %credential,
            attempts = %attempts,
            elapsed_ms = %start.elapsed().as_millis(),
            "payment_poll_timeout"
        );
        self.show(lane, DisplayLines::new("Payment timeout", "Try again")).await;
        false
    }

    async fn show(&self, lane: LaneId, lines: DisplayLines) {
        self.display.show(lane, LaneState::AwaitingPayment, lines).await;
    }
}
