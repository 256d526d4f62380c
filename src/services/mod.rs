//! Services - lane logic
//!
//! This module contains the access-control services:
//! - `debounce` - Per-lane duplicate read suppression
//! - `payment_poller` - Bounded deferred-payment polling
//! - `passage_monitor` - Vehicle passage watch while the barrier is open
//! - `lane` - Lane state machine, one episode per admitted credential
//! - `lane_worker` - Per-lane task feeding reads into the state machine

pub mod debounce;
pub mod lane;
pub mod lane_worker;
pub mod passage_monitor;
pub mod payment_poller;

// Re-export commonly used types
pub use debounce::CredentialDebounce;
pub use lane::{EpisodeReport, LaneCollaborators, LaneController, LaneSettings, LaneTimings};
pub use lane_worker::{create_lane_worker, LaneWorker};
pub use passage_monitor::{PassageSettings, VehiclePassageMonitor};
pub use payment_poller::{PaymentPoller, PollerSettings};
