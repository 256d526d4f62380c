//! Network availability check consulted before backend calls
//!
//! On Linux the link state of the uplink interface is read from
//! `/sys/class/net/<iface>/operstate`. Without a configured interface the
//! network is assumed to be available and transport errors surface instead.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Reads the kernel's operational state for one interface
pub struct LinkStateMonitor {
    interface: String,
    operstate_path: PathBuf,
}

impl LinkStateMonitor {
    pub fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
            operstate_path: PathBuf::from(format!("/sys/class/net/{interface}/operstate")),
        }
    }

    #[cfg(test)]
    fn with_path(interface: &str, path: PathBuf) -> Self {
        Self { interface: interface.to_string(), operstate_path: path }
    }
}

#[async_trait]
impl NetworkMonitor for LinkStateMonitor {
    async fn is_online(&self) -> bool {
        match tokio::fs::read_to_string(&self.operstate_path).await {
            Ok(state) => state.trim() == "up",
            Err(e) => {
                debug!(interface = %self.interface, error = %e, "link_state_unreadable");
                false
            }
        }
    }
}

pub struct AlwaysOnline;

#[async_trait]
impl NetworkMonitor for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}
