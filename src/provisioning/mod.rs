//! Over-the-air credential provisioning.
//!
//! A companion app announces credentials through a provisioning transport;
//! the [`ProvisioningStateMachine`] decodes, persists and applies them. The
//! machine runs for the life of the device so it can be re-provisioned at
//! any time, including while connected.
//!
//! # Components
//!
//! - [`machine`] - the provisioning state machine
//! - [`udp`] - JSON-over-UDP transport for host builds
//! - [`ble`] - BLE GATT transport (`esp32` feature)

use std::fmt;
use std::io;

#[cfg(feature = "esp32")]
mod ble;
mod machine;
#[cfg(not(target_os = "espidf"))]
mod udp;

#[cfg(feature = "esp32")]
pub use ble::BleProvisioning;
pub use machine::{ProvisioningPhase, ProvisioningSession, ProvisioningStateMachine};
#[cfg(not(target_os = "espidf"))]
pub use udp::{UdpProvisioning, WireAnnouncement, ACK, DEFAULT_PROVISION_ADDR, NACK};

/// Lifecycle of the provisioning protocol.
///
/// The protocol itself runs inside the transport; decoded announcements and
/// round completions are raised as
/// [`ProvisioningEvent`](crate::events::ProvisioningEvent)s.
pub trait ProvisioningTransport: Send + Sync {
    /// Begin listening for announcements.
    fn start(&self) -> Result<(), TransportError>;

    /// Stop listening. Safe to call when already stopped.
    fn stop(&self);
}

/// Provisioning transport failures.
#[derive(Debug)]
pub enum TransportError {
    /// Socket or file error.
    Io(io::Error),
    /// BLE stack error.
    Ble(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Ble(msg) => write!(f, "BLE error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Ble(_) => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
