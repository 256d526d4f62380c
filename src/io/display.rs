//! Lane status presentation
//!
//! All lanes share one status sink. `SharedDisplay` serializes access so an
//! update from one lane is never interleaved with another's, and remembers
//! what each lane shows last so a state change can keep the current lines.

use crate::domain::types::{epoch_ms, DisplayLines, LaneId, LaneState};
use crate::infra::metrics::Metrics;
use crate::io::mqtt_status::StatusPayload;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

/// One line pair shown for a lane, tagged with the lane's state
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub lane: LaneId,
    pub state: LaneState,
    pub lines: DisplayLines,
}

#[async_trait]
pub trait StatusDisplay: Send + Sync {
    async fn render(&self, update: &StatusUpdate);
}

struct DisplayInner {
    sink: Box<dyn StatusDisplay>,
    current: HashMap<LaneId, DisplayLines>,
}

/// Display handle cloned into every lane
#[derive(Clone)]
pub struct SharedDisplay {
    inner: Arc<Mutex<DisplayInner>>,
}

impl SharedDisplay {
    pub fn new(display: Box<dyn StatusDisplay>) -> Self {
        Self { inner: Arc::new(Mutex::new(DisplayInner { sink: display, current: HashMap::new() })) }
    }

    pub async fn show(&self, lane: LaneId, state: LaneState, lines: DisplayLines) {
        let mut inner = self.inner.lock().await;
        inner.current.insert(lane, lines.clone());
        let update = StatusUpdate { lane, state, lines };
        inner.sink.render(&update).await;
    }

    /// Show the lane's current lines again under a new state
    pub async fn restate(&self, lane: LaneId, state: LaneState) {
        let inner = self.inner.lock().await;
        let lines = inner.current.get(&lane).cloned().unwrap_or_default();
        let update = StatusUpdate { lane, state, lines };
        inner.sink.render(&update).await;
    }

    /// Lines the lane shows right now
    pub async fn current(&self, lane: LaneId) -> Option<DisplayLines> {
        self.inner.lock().await.current.get(&lane).cloned()
    }
}

/// Writes status lines to the structured log
pub struct LogDisplay;

#[async_trait]
impl StatusDisplay for LogDisplay {
    async fn render(&self, update: &StatusUpdate) {
        info!(
            lane = %update.lane,
            state = %update.state.as_str(),
            line1 = %update.lines.primary,
            line2 = %update.lines.secondary,
            "display"
        );
    }
}

/// Forwards status lines to the MQTT publisher for remote displays
pub struct MqttDisplay {
    site: String,
    tx: mpsc::Sender<StatusPayload>,
    metrics: Arc<Metrics>,
}

impl MqttDisplay {
    pub fn new(site: &str, tx: mpsc::Sender<StatusPayload>, metrics: Arc<Metrics>) -> Self {
        Self { site: site.to_string(), tx, metrics }
    }
}

#[async_trait]
impl StatusDisplay for MqttDisplay {
    async fn render(&self, update: &StatusUpdate) {
        let payload = StatusPayload {
            site: self.site.clone(),
            lane: update.lane,
            state: update.state,
            line1: update.lines.primary.clone(),
            line2: update.lines.secondary.clone(),
            ts: epoch_ms(),
        };
        // Never block a lane on the publisher
        match self.tx.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.metrics.record_display_update_dropped();
                warn!(lane = %update.lane, "display_update_dropped: channel full");
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.record_display_update_dropped();
                warn!(lane = %update.lane, "display_channel_closed");
            }
        }
    }
}
