//! Garden Link: connectivity core for a battery-powered garden monitor.
//!
//! Provisions WiFi credentials over the air, persists them, and keeps the
//! link alive across transient failures. Everything except the ESP-IDF
//! radio, NVS store and BLE transport builds and tests on the host.

pub mod config;
pub mod events;
pub mod link;
pub mod network;
pub mod persistence;
pub mod provisioning;
pub mod supervisor;
#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used items
pub use config::{Bssid, ConfigError, ConnectivitySettings, Credentials, RawAnnouncement};
pub use events::{EventDispatcher, EventKind, EventSink, LinkEvent, NetEvent, ProvisioningEvent};
pub use link::{Connectivity, InitError};
pub use network::{
    CapabilityError, ConnectError, ConnectionManager, ConnectionState, NetworkCapability,
};
pub use persistence::{CredentialStore, MemoryStore, StoreError};
pub use provisioning::{ProvisioningStateMachine, ProvisioningTransport, TransportError};
pub use supervisor::{ReconnectBackoff, ReconnectionSupervisor};
