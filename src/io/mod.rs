//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `backend` - HTTP client for authorization and payment status
//! - `network` - link state used as the connectivity preflight
//! - `reader` - RFID reader input (serial per lane, TCP for bench input)
//! - `relay` - HTTP relay client shared by barriers and the buzzer
//! - `barrier` - barrier actuators
//! - `buzzer` - acknowledgement chirp
//! - `sensor` - time-of-flight distance sensor
//! - `display` - lane status presentation
//! - `mqtt_status` - MQTT publisher for lane status
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod backend;
pub mod barrier;
pub mod buzzer;
pub mod display;
pub mod mqtt_status;
pub mod network;
pub mod prometheus;
pub mod reader;
pub mod relay;
pub mod sensor;

// Re-export commonly used types
pub use backend::{GateBackend, HttpBackend};
pub use barrier::{BarrierActuator, HttpRelayBarrier, SimulatedBarrier};
pub use buzzer::{Buzzer, RelayBuzzer, SilentBuzzer};
pub use display::{LogDisplay, MqttDisplay, SharedDisplay, StatusDisplay, StatusUpdate};
pub use mqtt_status::{create_status_channel, MqttStatusPublisher, StatusPayload};
pub use network::{AlwaysOnline, LinkStateMonitor, NetworkMonitor};
pub use reader::{start_reader_listener, SerialCredentialReader};
pub use relay::RelayClient;
pub use sensor::{AbsentSensor, DistanceSensor, EchoDistanceSensor, SerialEchoSource};
