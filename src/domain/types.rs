//! Shared types for the lane controller

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Character columns on the status display (16x2 LCD)
pub const DISPLAY_COLUMNS: usize = 16;

/// Current time as epoch milliseconds
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for lane IDs (1-based, sent to the backend as `cameraIndex`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct LaneId(pub u8);

impl std::fmt::Display for LaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialParseError {
    #[error("credential is empty")]
    Empty,
    #[error("credential contains non-hex character {0:?}")]
    NotHex(char),
    #[error("credential has odd digit count {0}")]
    OddLength(usize),
}

/// Credential read from an RFID tag: uppercase hex UID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CredentialId(String);

impl CredentialId {
    /// Parse a textual UID such as `"04a1b2c3"` or `"04:A1:B2:C3"`
    pub fn parse(text: &str) -> Result<Self, CredentialParseError> {
        let mut normalized = String::with_capacity(text.len());
        for c in text.trim().chars() {
            match c {
                ':' | '-' | ' ' => continue,
                c if c.is_ascii_hexdigit() => normalized.push(c.to_ascii_uppercase()),
                other => return Err(CredentialParseError::NotHex(other)),
            }
        }
        if normalized.is_empty() {
            return Err(CredentialParseError::Empty);
        }
        if normalized.len() % 2 != 0 {
            return Err(CredentialParseError::OddLength(normalized.len()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 hex digits, as shown on the display after a read
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl std::fmt::Display for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw read from a credential reader, before debounce
#[derive(Debug, Clone)]
pub struct CredentialRead {
    pub lane_id: LaneId,
    pub credential_id: CredentialId,
    pub received_at: Instant,
}

/// A read admitted by the lane's debounce rule. Immutable once built.
#[derive(Debug, Clone)]
pub struct CredentialEvent {
    lane_id: LaneId,
    credential_id: CredentialId,
    observed_at: Instant,
    wall_time: chrono::DateTime<chrono::Utc>,
}

impl CredentialEvent {
    pub fn new(lane_id: LaneId, credential_id: CredentialId, observed_at: Instant) -> Self {
        Self { lane_id, credential_id, observed_at, wall_time: chrono::Utc::now() }
    }

    pub fn lane_id(&self) -> LaneId {
        self.lane_id
    }

    pub fn credential_id(&self) -> &CredentialId {
        &self.credential_id
    }

    pub fn observed_at(&self) -> Instant {
        self.observed_at
    }

    pub fn wall_time(&self) -> chrono::DateTime<chrono::Utc> {
        self.wall_time
    }
}

/// Two display lines, each truncated to the display width
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisplayLines {
    pub primary: String,
    pub secondary: String,
}

impl DisplayLines {
    pub fn new(primary: impl AsRef<str>, secondary: impl AsRef<str>) -> Self {
        Self { primary: truncate(primary.as_ref()), secondary: truncate(secondary.as_ref()) }
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(DISPLAY_COLUMNS).collect()
}

/// Verdict returned by the authorization service for one credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationVerdict {
    Granted(DisplayLines),
    PendingPayment(DisplayLines),
    Denied(DisplayLines),
    /// Status string the controller does not know; handled like a denial
    Unrecognized { status: String, display: DisplayLines },
}

impl AuthorizationVerdict {
    pub fn as_str(&self) -> &str {
        match self {
            AuthorizationVerdict::Granted(_) => "granted",
            AuthorizationVerdict::PendingPayment(_) => "pending_payment",
            AuthorizationVerdict::Denied(_) => "denied",
            AuthorizationVerdict::Unrecognized { .. } => "unrecognized",
        }
    }
}

/// Failure talking to the authorization/payment service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("network unavailable")]
    NetworkUnavailable,
    /// Request did not complete or returned a non-success status
    #[error("transport failure: {reason}")]
    TransportFailure { status: Option<u16>, reason: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendError::NetworkUnavailable => "network_unavailable",
            BackendError::TransportFailure { .. } => "transport_failure",
            BackendError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Result of a single payment-status poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    OpenApproved(String),
    StillPending,
    PollFailed(BackendError),
}

/// Lane state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneState {
    Idle,
    Authorizing,
    AwaitingPayment,
    Opening,
    MonitoringPassage,
    Closing,
    Error,
}

impl LaneState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneState::Idle => "idle",
            LaneState::Authorizing => "authorizing",
            LaneState::AwaitingPayment => "awaiting_payment",
            LaneState::Opening => "opening",
            LaneState::MonitoringPassage => "monitoring_passage",
            LaneState::Closing => "closing",
            LaneState::Error => "error",
        }
    }

    /// States in which the barrier must never have an open command outstanding
    pub fn requires_closed_barrier(&self) -> bool {
        matches!(
            self,
            LaneState::Idle | LaneState::Authorizing | LaneState::AwaitingPayment | LaneState::Error
        )
    }

    /// Numeric code for the Prometheus lane state gauge
    pub fn code(&self) -> u64 {
        match self {
            LaneState::Idle => 0,
            LaneState::Authorizing => 1,
            LaneState::AwaitingPayment => 2,
            LaneState::Opening => 3,
            LaneState::MonitoringPassage => 4,
            LaneState::Closing => 5,
            LaneState::Error => 6,
        }
    }
}

/// One distance reading. `valid == false` means no echo (nothing in range).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehiclePresenceSample {
    pub distance_cm: f32,
    pub valid: bool,
}

impl VehiclePresenceSample {
    /// Speed of sound in cm per microsecond
    const SOUND_CM_PER_US: f32 = 0.034;

    pub fn no_echo() -> Self {
        Self { distance_cm: -1.0, valid: false }
    }

    /// Convert a round-trip echo time into a one-way distance
    pub fn from_echo_us(echo_us: u32) -> Self {
        if echo_us == 0 {
            return Self::no_echo();
        }
        Self { distance_cm: echo_us as f32 * Self::SOUND_CM_PER_US / 2.0, valid: true }
    }

    pub fn within(&self, threshold_cm: f32) -> bool {
        self.valid && self.distance_cm > 0.0 && self.distance_cm < threshold_cm
    }
}

/// How a passage watch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassageOutcome {
    ClearedNormally,
    TimedOut,
}

/// Last command issued to the barrier (there is no position feedback)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierPosition {
    Open,
    Closed,
}

impl BarrierPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarrierPosition::Open => "open",
            BarrierPosition::Closed => "closed",
        }
    }
}

/// Terminal classification of one episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EpisodeOutcome {
    Passed,
    PassageTimedOut,
    Denied,
    Unrecognized,
    PaymentNotConfirmed,
    NetworkUnavailable,
    TransportFailure,
    MalformedResponse,
}

impl EpisodeOutcome {
    pub const ALL: [EpisodeOutcome; 8] = [
        EpisodeOutcome::Passed,
        EpisodeOutcome::PassageTimedOut,
        EpisodeOutcome::Denied,
        EpisodeOutcome::Unrecognized,
        EpisodeOutcome::PaymentNotConfirmed,
        EpisodeOutcome::NetworkUnavailable,
        EpisodeOutcome::TransportFailure,
        EpisodeOutcome::MalformedResponse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeOutcome::Passed => "passed",
            EpisodeOutcome::PassageTimedOut => "passage_timed_out",
            EpisodeOutcome::Denied => "denied",
            EpisodeOutcome::Unrecognized => "unrecognized",
            EpisodeOutcome::PaymentNotConfirmed => "payment_not_confirmed",
            EpisodeOutcome::NetworkUnavailable => "network_unavailable",
            EpisodeOutcome::TransportFailure => "transport_failure",
            EpisodeOutcome::MalformedResponse => "malformed_response",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl From<&BackendError> for EpisodeOutcome {
    fn from(err: &BackendError) -> Self {
        match err {
            BackendError::NetworkUnavailable => EpisodeOutcome::NetworkUnavailable,
            BackendError::TransportFailure { .. } => EpisodeOutcome::TransportFailure,
            BackendError::MalformedResponse(_) => EpisodeOutcome::MalformedResponse,
        }
    }
}
