//! Network capability abstraction and connection management.
//!
//! This module provides a platform-independent radio interface that works on:
//! - **ESP32** (`esp32` feature): ESP-IDF WiFi station driver
//! - **Host**: a simulated radio that associates instantly
//!
//! The radio only *requests* association; completion arrives later as
//! [`LinkEvent`](crate::events::LinkEvent)s through the event dispatcher.
//! [`ConnectionManager`] is the single caller of
//! [`NetworkCapability::apply_and_connect`].

use std::fmt;

mod host;
mod manager;
#[cfg(feature = "esp32")]
mod wifi;

pub use host::HostRadio;
pub use manager::{ConnectError, ConnectionManager, ConnectionState};
#[cfg(feature = "esp32")]
pub use wifi::EspRadio;

use crate::config::Credentials;

/// Radio driver abstraction.
///
/// Both calls are requests: they return once the driver accepted or refused
/// the command, and report the resulting association changes as link events.
pub trait NetworkCapability: Send + Sync {
    /// Drop any current association.
    fn disconnect(&self) -> Result<(), CapabilityError>;

    /// Apply `credentials` as the station configuration and start associating.
    fn apply_and_connect(&self, credentials: &Credentials) -> Result<(), CapabilityError>;
}

/// Synchronous rejection of a radio request.
#[derive(Debug)]
pub enum CapabilityError {
    /// The driver cannot represent the SSID.
    InvalidSsid,
    /// The driver cannot represent the password.
    InvalidPassword,
    /// The driver refused the request.
    Rejected(String),
    /// ESP-IDF error.
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "invalid SSID"),
            Self::InvalidPassword => write!(f, "invalid password"),
            Self::Rejected(reason) => write!(f, "request rejected: {}", reason),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "ESP error: {:?}", e),
        }
    }
}

impl std::error::Error for CapabilityError {}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for CapabilityError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}
