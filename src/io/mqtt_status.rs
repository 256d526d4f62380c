//! MQTT publisher for lane status
//!
//! Publishes every display update as JSON to the status topic (QoS 0) so
//! remote signage and dashboards can mirror the lane displays.

use crate::domain::types::{LaneId, LaneState};
use crate::infra::config::Config;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Payload published for each display update
#[derive(Debug, Clone, Serialize)]
pub struct StatusPayload {
    pub site: String,
    pub lane: LaneId,
    pub state: LaneState,
    pub line1: String,
    pub line2: String,
    /// Timestamp (epoch ms)
    pub ts: u64,
}

/// Create the bounded status channel feeding the publisher
pub fn create_status_channel(
    buffer_size: usize,
) -> (mpsc::Sender<StatusPayload>, mpsc::Receiver<StatusPayload>) {
    mpsc::channel(buffer_size)
}

/// MQTT publisher actor
pub struct MqttStatusPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<StatusPayload>,
    topic: String,
}

impl MqttStatusPublisher {
    /// Create a new publisher connected to the configured broker
    pub fn new(config: &Config, rx: mpsc::Receiver<StatusPayload>) -> Self {
        let client_id = format!("lanegate-status-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        // Spawn the eventloop handler
        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_status_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_status_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, rx, topic: config.mqtt_status_topic().to_string() }
    }

    /// Publish until shutdown, then drain what is queued
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(topic = %self.topic, "mqtt_status_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mqtt_status_shutdown");
                        while let Ok(payload) = self.rx.try_recv() {
                            self.publish(payload).await;
                        }
                        return;
                    }
                }
                msg = self.rx.recv() => {
                    match msg {
                        Some(payload) => self.publish(payload).await,
                        None => return,
                    }
                }
            }
        }
    }

    async fn publish(&self, payload: StatusPayload) {
        if let Ok(json) = serde_json::to_string(&payload) {
            if let Err(e) =
                self.client.publish(&self.topic, QoS::AtMostOnce, false, json.as_bytes()).await
            {
                debug!(error = %e, "mqtt_status_publish_failed");
            }
        }
    }
}
