//! Durable storage for the last-known-good credentials.
//!
//! # Components
//!
//! - [`MemoryStore`] - volatile store for tests and diskless setups
//! - [`FileStore`] - JSON file under the user's home directory (host only)
//! - [`NvsStore`] - ESP32 Non-Volatile Storage (`esp32` feature)
//!
//! Every store serializes its own `load`/`save` calls internally, so the
//! provisioning task and the supervisor may share one store freely.

use crate::config::{ConfigError, Credentials};
use std::fmt;
use std::io;

#[cfg(not(target_os = "espidf"))]
mod file;
mod memory;
#[cfg(feature = "esp32")]
mod nvs;

#[cfg(not(target_os = "espidf"))]
pub use file::{default_store_path, FileStore};
pub use memory::MemoryStore;
#[cfg(feature = "esp32")]
pub use nvs::NvsStore;

/// Key/value persistence for credentials.
pub trait CredentialStore: Send + Sync {
    /// Most recently saved credentials.
    ///
    /// Returns `None` if nothing is stored or the stored data is unreadable.
    fn load(&self) -> Option<Credentials>;

    /// Replace the stored credentials.
    fn save(&self, credentials: &Credentials) -> Result<(), StoreError>;
}

/// Persistence failures.
#[derive(Debug)]
pub enum StoreError {
    /// Filesystem error.
    Io(io::Error),
    /// Stored data could not be encoded or decoded.
    Format(String),
    /// Data read back after a write did not match.
    VerificationFailed,
    /// ESP-IDF NVS error.
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Format(msg) => write!(f, "format error: {}", msg),
            Self::VerificationFailed => write!(f, "read-back verification failed"),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "NVS error: {:?}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ConfigError> for StoreError {
    fn from(e: ConfigError) -> Self {
        Self::Format(e.to_string())
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for StoreError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}
