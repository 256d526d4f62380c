//! Domain models - core types shared across the controller
//!
//! This module contains the canonical data types used throughout the system:
//! - `CredentialId` / `CredentialEvent` - credential reads admitted by debounce
//! - `AuthorizationVerdict` - the backend's decision for a credential
//! - `PollOutcome` - result of one payment-status poll
//! - `LaneState` - per-lane state machine position
//! - `VehiclePresenceSample` / `PassageOutcome` - passage sensing

pub mod types;
