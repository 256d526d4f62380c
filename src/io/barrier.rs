//! Lane barrier actuator
//!
//! Commands are absolute (open/closed) and fire-and-forget: there is no
//! position feedback, so a failed relay call is logged and counted but
//! never changes the lane's control flow.

use crate::domain::types::LaneId;
use crate::infra::metrics::Metrics;
use crate::io::relay::{RelayClient, RelayTarget};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

#[async_trait]
pub trait BarrierActuator: Send + Sync {
    async fn open(&self);
    async fn close(&self);
}

/// Barrier driven through two relay URLs (open channel, close channel)
pub struct HttpRelayBarrier {
    lane: LaneId,
    open: RelayTarget,
    close: RelayTarget,
    relay: Arc<RelayClient>,
    metrics: Arc<Metrics>,
}

impl HttpRelayBarrier {
    pub fn new(
        lane: LaneId,
        open_url: &str,
        close_url: &str,
        relay: Arc<RelayClient>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            lane,
            open: RelayTarget::parse(open_url),
            close: RelayTarget::parse(close_url),
            relay,
            metrics,
        }
    }

    async fn command(&self, target: &RelayTarget, position: &str) {
        match self.relay.trigger(target).await {
            Ok(latency_us) => {
                info!(
                    lane = %self.lane,
                    position = %position,
                    latency_us = %latency_us,
                    "barrier_command"
                );
            }
            Err(e) => {
                self.metrics.record_barrier_command_failure();
                error!(
                    lane = %self.lane,
                    position = %position,
                    error = %e,
                    "barrier_command_error"
                );
            }
        }
    }
}

#[async_trait]
impl BarrierActuator for HttpRelayBarrier {
    async fn open(&self) {
        self.command(&self.open, "open").await;
    }

    async fn close(&self) {
        self.command(&self.close, "closed").await;
    }
}

/// Bench barrier that only logs commands
pub struct SimulatedBarrier {
    lane: LaneId,
}

impl SimulatedBarrier {
    pub fn new(lane: LaneId) -> Self {
        Self { lane }
    }
}

#[async_trait]
impl BarrierActuator for SimulatedBarrier {
    async fn open(&self) {
        info!(lane = %self.lane, position = "open", simulated = true, "barrier_command");
    }

    async fn close(&self) {
        info!(lane = %self.lane, position = "closed", simulated = true, "barrier_command");
    }
}
