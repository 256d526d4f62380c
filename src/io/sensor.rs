//! Time-of-flight distance sensor
//!
//! The ranging module sits on a serial line. Protocol:
//! - Host sends trigger byte 0x55
//! - Module answers with the echo round-trip time in microseconds,
//!   2 bytes big-endian (0x0000 = no echo)
//!
//! Anything that is not a timely, complete answer reads as "no echo": the
//! module has no failure signal distinct from "nothing in range".

use crate::domain::types::VehiclePresenceSample;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

const TRIGGER_BYTE: u8 = 0x55;
const ECHO_FRAME_LEN: usize = 2;

#[async_trait]
pub trait DistanceSensor: Send + Sync {
    async fn sample(&self) -> VehiclePresenceSample;
}

/// Raw pulse/echo measurement
#[async_trait]
pub trait EchoSource: Send {
    /// Fire one ranging pulse and return the echo time, or `None` if no echo
    /// arrived within `timeout`
    async fn measure_echo_us(&mut self, timeout: Duration) -> Option<u32>;
}

/// Converts echo timing into distance. Shared between lanes, so the source
/// is locked for the duration of one measurement.
pub struct EchoDistanceSensor<S> {
    source: Mutex<S>,
    echo_timeout: Duration,
}

impl<S: EchoSource> EchoDistanceSensor<S> {
    pub fn new(source: S, echo_timeout: Duration) -> Self {
        Self { source: Mutex::new(source), echo_timeout }
    }
}

#[async_trait]
impl<S: EchoSource + 'static> DistanceSensor for EchoDistanceSensor<S> {
    async fn sample(&self) -> VehiclePresenceSample {
        let mut source = self.source.lock().await;
        match source.measure_echo_us(self.echo_timeout).await {
            Some(echo_us) => VehiclePresenceSample::from_echo_us(echo_us),
            None => VehiclePresenceSample::no_echo(),
        }
    }
}

/// Ranging module on a serial port
pub struct SerialEchoSource {
    device: String,
    port: SerialStream,
}

impl SerialEchoSource {
    pub fn open(device: &str, baud: u32) -> anyhow::Result<Self> {
        let port = tokio_serial::new(device, baud).open_native_async()?;
        Ok(Self { device: device.to_string(), port })
    }
}

#[async_trait]
impl EchoSource for SerialEchoSource {
    async fn measure_echo_us(&mut self, timeout: Duration) -> Option<u32> {
        // Drop stale bytes from an earlier late answer
        let mut scratch = [0u8; 16];
        while let Ok(Ok(n)) =
            tokio::time::timeout(Duration::ZERO, self.port.read(&mut scratch)).await
        {
            if n == 0 {
                break;
            }
        }

        if let Err(e) = self.port.write_all(&[TRIGGER_BYTE]).await {
            debug!(device = %self.device, error = %e, "sensor_trigger_failed");
            return None;
        }

        let mut frame = [0u8; ECHO_FRAME_LEN];
        match tokio::time::timeout(timeout, self.port.read_exact(&mut frame)).await {
            Ok(Ok(_)) => decode_echo_frame(frame),
            Ok(Err(e)) => {
                debug!(device = %self.device, error = %e, "sensor_read_failed");
                None
            }
            Err(_) => None,
        }
    }
}

fn decode_echo_frame(frame: [u8; ECHO_FRAME_LEN]) -> Option<u32> {
    match u16::from_be_bytes(frame) {
        0 => None,
        echo_us => Some(echo_us as u32),
    }
}

/// Lane without a ranging module: nothing is ever detected, so the barrier
/// closes when the passage watch budget runs out
pub struct AbsentSensor;

#[async_trait]
impl DistanceSensor for AbsentSensor {
    async fn sample(&self) -> VehiclePresenceSample {
        VehiclePresenceSample::no_echo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedEcho {
        echoes: VecDeque<Option<u32>>,
        last_timeout: Option<Duration>,
    }

    #[async_trait]
    impl EchoSource for ScriptedEcho {
        async fn measure_echo_us(&mut self, timeout: Duration) -> Option<u32> {
            self.last_timeout = Some(timeout);
            self.echoes.pop_front().flatten()
        }
    }

    #[test]
    fn test_decode_echo_frame() {
        assert_eq!(decode_echo_frame([0x00, 0x00]), None);
        assert_eq!(decode_echo_frame([0x03, 0xE8]), Some(1000));
    }

    #[tokio::test]
    async fn test_echo_converted_to_distance() {
        let source = ScriptedEcho { echoes: VecDeque::from([Some(1000), None]), last_timeout: None };
        let sensor = EchoDistanceSensor::new(source, Duration::from_millis(30));

        let near = sensor.sample().await;
        assert!(near.valid);
        assert!((near.distance_cm - 17.0).abs() < 0.001);

        let none = sensor.sample().await;
        assert!(!none.valid);

        let source = sensor.source.lock().await;
        assert_eq!(source.last_timeout, Some(Duration::from_millis(30)));
    }

    #[tokio::test]
    async fn test_absent_sensor_never_detects() {
        let sample = AbsentSensor.sample().await;
        assert!(!sample.valid);
        assert!(!sample.within(20.0));
    }
}
