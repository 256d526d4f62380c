//! Lane worker - one task per lane
//!
//! Consumes raw credential reads for its lane, applies the debounce rule and
//! runs one episode at a time on the lane controller. Reads that queued up
//! while an episode was running are discarded afterwards: a card held to a
//! busy lane is not remembered.

use crate::domain::types::CredentialRead;
use crate::infra::metrics::Metrics;
use crate::services::debounce::CredentialDebounce;
use crate::services::lane::{EpisodeReport, LaneController};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

pub struct LaneWorker {
    controller: LaneController,
    debounce: CredentialDebounce,
    rx: mpsc::Receiver<CredentialRead>,
    metrics: Arc<Metrics>,
}

impl LaneWorker {
    pub fn new(
        controller: LaneController,
        debounce_window: Duration,
        rx: mpsc::Receiver<CredentialRead>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { controller, debounce: CredentialDebounce::new(debounce_window), rx, metrics }
    }

    /// Run until shutdown or until every reader is gone. An episode in
    /// progress always finishes first.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let lane = self.controller.lane();
        self.controller.reset().await;
        info!(lane = %lane, "lane_worker_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                read = self.rx.recv() => {
                    match read {
                        Some(read) => {
                            self.process_read(read).await;
                        }
                        None => break,
                    }
                }
            }
        }

        info!(lane = %lane, "lane_worker_stopped");
    }

    /// Handle one raw read. Returns the episode report if it started one.
    pub async fn process_read(&mut self, read: CredentialRead) -> Option<EpisodeReport> {
        self.metrics.record_read();

        let Some(event) = self.debounce.admit(&read) else {
            self.metrics.record_read_debounced();
            debug!(lane = %read.lane_id, credential = %read.credential_id, "credential_debounced");
            return None;
        };

        let report = self.controller.handle(&event).await;
        self.discard_queued();
        Some(report)
    }

    fn discard_queued(&mut self) {
        let mut discarded = 0u32;
        while let Ok(read) = self.rx.try_recv() {
            self.metrics.record_read();
            self.metrics.record_read_discarded_busy();
            debug!(lane = %read.lane_id, credential = %read.credential_id, "credential_read_dropped: lane busy");
            discarded += 1;
        }
        if discarded > 0 {
            info!(lane = %self.controller.lane(), discarded = %discarded, "busy_reads_discarded");
        }
    }
}

/// Create a lane's read channel and worker
///
/// Returns the sender (for readers) and the worker (to be spawned)
pub fn create_lane_worker(
    controller: LaneController,
    debounce_window: Duration,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (mpsc::Sender<CredentialRead>, LaneWorker) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let worker = LaneWorker::new(controller, debounce_window, rx, metrics);
    (tx, worker)
}
