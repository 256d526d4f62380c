//! Credential reader inputs
//!
//! Two sources feed the lane workers with raw reads:
//! - `SerialCredentialReader` - one RFID reader per lane on a serial line,
//!   emitting one UID per line (hex, `:`/`-` separators allowed)
//! - `start_reader_listener` - TCP listener for bench and simulation input.
//!   Protocol: "CARD <lane> <uid>\n"
//!
//! Reads are forwarded with `try_send`; a full channel means the lane is
//! mid-episode and the read is dropped, as a card held to a busy lane is.

use crate::domain::types::{CredentialId, CredentialRead, LaneId};
use crate::infra::metrics::Metrics;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

/// Delay before reopening a reader port that failed or closed
const REOPEN_DELAY: Duration = Duration::from_secs(5);

/// Forward a read to its lane. Returns false once the lane worker is gone.
fn forward_read(
    tx: &mpsc::Sender<CredentialRead>,
    read: CredentialRead,
    metrics: &Metrics,
) -> bool {
    let lane = read.lane_id;
    match tx.try_send(read) {
        Ok(()) => true,
        Err(TrySendError::Full(read)) => {
            metrics.record_read();
            metrics.record_read_discarded_busy();
            debug!(lane = %lane, credential = %read.credential_id, "credential_read_dropped: lane busy");
            true
        }
        Err(TrySendError::Closed(_)) => {
            warn!(lane = %lane, "credential_channel_closed");
            false
        }
    }
}

/// RFID reader attached to one lane over a serial line
pub struct SerialCredentialReader {
    lane: LaneId,
    device: String,
    baud: u32,
    tx: mpsc::Sender<CredentialRead>,
    metrics: Arc<Metrics>,
}

impl SerialCredentialReader {
    pub fn new(
        lane: LaneId,
        device: &str,
        baud: u32,
        tx: mpsc::Sender<CredentialRead>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { lane, device: device.to_string(), baud, tx, metrics }
    }

    /// Read UIDs until shutdown, reopening the port after failures
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(lane = %self.lane, device = %self.device, baud = %self.baud, "reader_started");

        loop {
            let port = match tokio_serial::new(&self.device, self.baud).open_native_async() {
                Ok(port) => {
                    info!(lane = %self.lane, device = %self.device, "reader_port_opened");
                    port
                }
                Err(e) => {
                    error!(lane = %self.lane, device = %self.device, error = %e, "reader_port_open_failed");
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                        _ = tokio::time::sleep(REOPEN_DELAY) => {}
                    }
                    continue;
                }
            };

            let mut lines = BufReader::new(port).lines();
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!(lane = %self.lane, "reader_shutdown");
                            return;
                        }
                    }
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                if !self.handle_line(&line) {
                                    return;
                                }
                            }
                            Ok(None) => {
                                warn!(lane = %self.lane, "reader_port_closed");
                                break;
                            }
                            Err(e) => {
                                warn!(lane = %self.lane, error = %e, "reader_read_error");
                                break;
                            }
                        }
                    }
                }
            }

            tokio::time::sleep(REOPEN_DELAY).await;
        }
    }

    fn handle_line(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return true;
        }
        match CredentialId::parse(line) {
            Ok(credential_id) => {
                debug!(lane = %self.lane, credential = %credential_id, "credential_read");
                let read =
                    CredentialRead { lane_id: self.lane, credential_id, received_at: Instant::now() };
                forward_read(&self.tx, read, &self.metrics)
            }
            Err(e) => {
                warn!(lane = %self.lane, line = %line, error = %e, "reader_invalid_uid");
                true
            }
        }
    }
}

/// Parse "CARD <lane> <uid>"
pub fn parse_card_line(line: &str) -> Option<(LaneId, CredentialId)> {
    let rest = line.trim().strip_prefix("CARD ")?;
    let mut parts = rest.split_whitespace();
    let lane = parts.next()?.parse::<u8>().ok()?;
    let uid = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let credential = CredentialId::parse(uid).ok()?;
    Some((LaneId(lane), credential))
}

/// Start the TCP credential listener
pub async fn start_reader_listener(
    port: u16,
    lanes: HashMap<LaneId, mpsc::Sender<CredentialRead>>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let lanes = Arc::new(lanes);

    info!(port = %port, "reader_listener_started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("reader_listener_shutdown");
                    return Ok(());
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((socket, addr)) => {
                        let lanes = lanes.clone();
                        let m = metrics.clone();
                        tokio::spawn(async move {
                            handle_reader_connection(socket, addr, lanes, m).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "reader_listener_accept_failed");
                    }
                }
            }
        }
    }
}

async fn handle_reader_connection(
    socket: tokio::net::TcpStream,
    addr: SocketAddr,
    lanes: Arc<HashMap<LaneId, mpsc::Sender<CredentialRead>>>,
    metrics: Arc<Metrics>,
) {
    let peer = addr.to_string();
    debug!(peer = %peer, "reader_connection_accepted");

    let mut lines = BufReader::new(socket).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let Some((lane, credential_id)) = parse_card_line(&line) else {
            debug!(peer = %peer, line = %line.trim(), "reader_unknown_message");
            continue;
        };
        let Some(tx) = lanes.get(&lane) else {
            warn!(peer = %peer, lane = %lane, "reader_unknown_lane");
            continue;
        };
        info!(peer = %peer, lane = %lane, credential = %credential_id, "credential_read");
        let read = CredentialRead { lane_id: lane, credential_id, received_at: Instant::now() };
        forward_read(tx, read, &metrics);
    }

    debug!(peer = %peer, "reader_connection_closed");
}
