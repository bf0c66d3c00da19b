//! NVS persistence for WiFi credentials.
//!
//! This module stores credentials in ESP32's Non-Volatile Storage (NVS)
//! so they persist across reboots.

use super::{CredentialStore, StoreError};
use crate::config::{Credentials, BSSID_LEN, MAX_PASSWORD_LEN, MAX_SSID_LEN};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use log::{debug, info, warn};
use std::sync::Mutex;

/// NVS namespace for WiFi configuration.
const NVS_NAMESPACE: &str = "wifi";

/// NVS key for stored credentials.
const NVS_KEY: &str = "credentials";

/// Format: [ssid_len:1][ssid:32][password_len:1][password:64][bssid_set:1][bssid:6]
const MAX_RECORD_SIZE: usize = 1 + MAX_SSID_LEN + 1 + MAX_PASSWORD_LEN + 1 + BSSID_LEN;

/// NVS-backed [`CredentialStore`].
pub struct NvsStore {
    nvs: Mutex<EspNvs<NvsDefault>>,
}

impl NvsStore {
    /// Open the credentials namespace on the default partition.
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, EspError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        Ok(Self {
            nvs: Mutex::new(nvs),
        })
    }
}

impl CredentialStore for NvsStore {
    fn load(&self) -> Option<Credentials> {
        let nvs = self.nvs.lock().ok()?;
        let mut buf = [0u8; MAX_RECORD_SIZE];
        let bytes = match nvs.get_raw(NVS_KEY, &mut buf) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("No credentials found in NVS");
                return None;
            }
            Err(e) => {
                warn!("Failed to read credentials from NVS: {:?}", e);
                return None;
            }
        };
        match Credentials::from_bytes(bytes) {
            Ok(creds) => Some(creds),
            Err(e) => {
                warn!("Stored credentials are corrupted: {}", e);
                None
            }
        }
    }

    fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let mut nvs = self
            .nvs
            .lock()
            .map_err(|_| StoreError::Format("NVS lock poisoned".into()))?;
        let bytes = credentials.to_bytes();
        nvs.set_raw(NVS_KEY, &bytes)?;

        // Read back to catch silent flash write failures
        let mut verify = [0u8; MAX_RECORD_SIZE];
        match nvs.get_raw(NVS_KEY, &mut verify)? {
            Some(read) if read == bytes.as_slice() => {
                info!("Credentials saved and verified in NVS");
                Ok(())
            }
            _ => Err(StoreError::VerificationFailed),
        }
    }
}
