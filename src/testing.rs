//! Scripted collaborators for lane tests

use crate::domain::types::{
    AuthorizationVerdict, BackendError, BarrierPosition, CredentialId, DisplayLines, LaneId,
    LaneState, PollOutcome, VehiclePresenceSample,
};
use crate::io::backend::GateBackend;
use crate::io::barrier::BarrierActuator;
use crate::io::buzzer::Buzzer;
use crate::io::display::{SharedDisplay, StatusDisplay, StatusUpdate};
use crate::io::sensor::DistanceSensor;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Backend answering from queues. An empty verdict queue denies; an empty
/// poll queue keeps the payment pending.
#[derive(Default)]
pub struct FakeBackend {
    verdicts: Mutex<VecDeque<Result<AuthorizationVerdict, BackendError>>>,
    polls: Mutex<VecDeque<PollOutcome>>,
    authorize_calls: AtomicUsize,
    poll_times: Mutex<Vec<Instant>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verdict(self, verdict: Result<AuthorizationVerdict, BackendError>) -> Self {
        self.verdicts.lock().push_back(verdict);
        self
    }

    pub fn with_polls(self, polls: impl IntoIterator<Item = PollOutcome>) -> Self {
        self.polls.lock().extend(polls);
        self
    }

    pub fn authorize_calls(&self) -> usize {
        self.authorize_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_times.lock().len()
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.poll_times.lock().clone()
    }
}

#[async_trait]
impl GateBackend for FakeBackend {
    async fn authorize(
        &self,
        _lane: LaneId,
        _credential: &CredentialId,
    ) -> Result<AuthorizationVerdict, BackendError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        self.verdicts
            .lock()
            .pop_front()
            .unwrap_or(Ok(AuthorizationVerdict::Denied(Default::default())))
    }

    async fn check_gate_command(&self, _credential: &CredentialId) -> PollOutcome {
        self.poll_times.lock().push(Instant::now());
        self.polls.lock().pop_front().unwrap_or(PollOutcome::StillPending)
    }
}

#[derive(Default)]
pub struct RecordingBarrier {
    commands: Mutex<Vec<BarrierPosition>>,
}

impl RecordingBarrier {
    pub fn commands(&self) -> Vec<BarrierPosition> {
        self.commands.lock().clone()
    }

    pub fn opens(&self) -> usize {
        self.commands().iter().filter(|c| **c == BarrierPosition::Open).count()
    }

    pub fn closes(&self) -> usize {
        self.commands().iter().filter(|c| **c == BarrierPosition::Closed).count()
    }
}

#[async_trait]
impl BarrierActuator for RecordingBarrier {
    async fn open(&self) {
        self.commands.lock().push(BarrierPosition::Open);
    }

    async fn close(&self) {
        self.commands.lock().push(BarrierPosition::Closed);
    }
}

/// Display that keeps every update; clones share the same history
#[derive(Clone, Default)]
pub struct RecordingDisplay {
    updates: Arc<Mutex<Vec<StatusUpdate>>>,
}

impl RecordingDisplay {
    pub fn shared(&self) -> SharedDisplay {
        SharedDisplay::new(Box::new(self.clone()))
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().clone()
    }

    pub fn primaries(&self) -> Vec<String> {
        self.updates().into_iter().map(|u| u.lines.primary).collect()
    }

    /// Lines rendered while `lane` was in `state`, in order
    pub fn lines_in(&self, lane: LaneId, state: LaneState) -> Vec<DisplayLines> {
        self.updates()
            .into_iter()
            .filter(|u| u.lane == lane && u.state == state)
            .map(|u| u.lines)
            .collect()
    }

    pub fn states_of(&self, lane: LaneId) -> Vec<LaneState> {
        let mut states: Vec<LaneState> = Vec::new();
        for update in self.updates().into_iter().filter(|u| u.lane == lane) {
            if states.last() != Some(&update.state) {
                states.push(update.state);
            }
        }
        states
    }

    pub fn shows(&self, primary: &str, secondary: &str) -> bool {
        self.updates()
            .iter()
            .any(|u| u.lines.primary == primary && u.lines.secondary == secondary)
    }
}

#[async_trait]
impl StatusDisplay for RecordingDisplay {
    async fn render(&self, update: &StatusUpdate) {
        self.updates.lock().push(update.clone());
    }
}

/// Sensor replaying a fixed sequence, then reporting no echo
#[derive(Default)]
pub struct ScriptedSensor {
    samples: Mutex<VecDeque<VehiclePresenceSample>>,
    taken: AtomicUsize,
}

impl ScriptedSensor {
    pub fn new(samples: impl IntoIterator<Item = VehiclePresenceSample>) -> Self {
        Self { samples: Mutex::new(samples.into_iter().collect()), taken: AtomicUsize::new(0) }
    }

    pub fn taken(&self) -> usize {
        self.taken.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DistanceSensor for ScriptedSensor {
    async fn sample(&self) -> VehiclePresenceSample {
        self.taken.fetch_add(1, Ordering::SeqCst);
        self.samples.lock().pop_front().unwrap_or_else(VehiclePresenceSample::no_echo)
    }
}

pub fn at_cm(distance_cm: f32) -> VehiclePresenceSample {
    VehiclePresenceSample { distance_cm, valid: true }
}

#[derive(Default)]
pub struct CountingBuzzer {
    chirps: AtomicUsize,
}

impl CountingBuzzer {
    pub fn chirps(&self) -> usize {
        self.chirps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Buzzer for CountingBuzzer {
    async fn chirp(&self) {
        self.chirps.fetch_add(1, Ordering::SeqCst);
    }
}
