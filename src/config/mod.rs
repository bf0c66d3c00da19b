//! Connectivity configuration.
//!
//! # Components
//!
//! - [`credentials`] - network credentials, validation and decoding (host-testable)
//! - [`settings`] - timing parameters for the background loops

mod credentials;
mod settings;

pub use credentials::{
    Bssid, ConfigError, Credentials, RawAnnouncement, BSSID_LEN, MAX_PASSWORD_LEN, MAX_SSID_LEN,
};
pub use settings::{ConnectivitySettings, SettingsError, ENV_PREFIX};
