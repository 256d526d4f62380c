//! Audible confirmation of a credential read
//!
//! Purely observational: the lane never waits on or reacts to the outcome.
//! A failed pulse still ends with the channel switched off.

use crate::infra::config::BuzzerConfig;
use crate::io::relay::{RelayClient, RelayTarget};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait Buzzer: Send + Sync {
    /// Play the fixed "card read" pulse pattern
    async fn chirp(&self);
}

/// Buzzer on a relay channel, pulsed with equal on and off times
pub struct RelayBuzzer {
    on: RelayTarget,
    off: RelayTarget,
    pulses: u32,
    pulse: Duration,
    relay: Arc<RelayClient>,
}

impl RelayBuzzer {
    pub fn new(config: &BuzzerConfig, relay: Arc<RelayClient>) -> Self {
        Self {
            on: RelayTarget::parse(&config.on_url),
            off: RelayTarget::parse(&config.off_url),
            pulses: config.pulses,
            pulse: Duration::from_millis(config.pulse_ms),
            relay,
        }
    }
}

impl RelayBuzzer {
    /// Switch the channel off once more after a failed pulse. The relay may
    /// have latched on even when its reply was lost or rejected.
    async fn release(&self) {
        if let Err(e) = self.relay.trigger(&self.off).await {
            warn!(error = %e, url = %self.off.url(), "buzzer_release_failed");
        }
    }
}

#[async_trait]
impl Buzzer for RelayBuzzer {
    async fn chirp(&self) {
        for _ in 0..self.pulses {
            if let Err(e) = self.relay.trigger(&self.on).await {
                debug!(error = %e, "buzzer_pulse_failed");
                self.release().await;
                return;
            }
            tokio::time::sleep(self.pulse).await;
            if let Err(e) = self.relay.trigger(&self.off).await {
                debug!(error = %e, "buzzer_pulse_failed");
                self.release().await;
                return;
            }
            tokio::time::sleep(self.pulse).await;
        }
    }
}

pub struct SilentBuzzer;

#[async_trait]
impl Buzzer for SilentBuzzer {
    async fn chirp(&self) {}
}
