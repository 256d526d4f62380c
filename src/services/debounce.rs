//! Per-lane credential debounce
//!
//! A read of the same credential as the last admitted one is suppressed
//! until the window has elapsed since that admission. A different credential
//! is always admitted. Suppressed reads do not extend the window.

use crate::domain::types::{CredentialEvent, CredentialId, CredentialRead};
use std::time::Duration;
use tokio::time::Instant;

pub struct CredentialDebounce {
    window: Duration,
    last: Option<(CredentialId, Instant)>,
}

impl CredentialDebounce {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Admit a raw read, producing the event that starts an episode
    pub fn admit(&mut self, read: &CredentialRead) -> Option<CredentialEvent> {
        if let Some((last_id, last_at)) = &self.last {
            if *last_id == read.credential_id
                && read.received_at.saturating_duration_since(*last_at) < self.window
            {
                return None;
            }
        }

        self.last = Some((read.credential_id.clone(), read.received_at));
        Some(CredentialEvent::new(read.lane_id, read.credential_id.clone(), read.received_at))
    }
}
