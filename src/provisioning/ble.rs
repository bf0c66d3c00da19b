//! BLE GATT provisioning transport.
//!
//! A phone app (nRF Connect works) writes the fields, then the command:
//!
//! ```text
//! Service: Garden Link Provisioning
//! ├── Status (Read)    - connection state: idle/connecting/connected/disconnected
//! ├── SSID (Write)     - network name, may be NUL padded
//! ├── Password (Write) - network password, may be NUL padded
//! ├── BSSID (Write)    - optional 6-byte access point address
//! └── Command (Write)  - "connect" or "clear"
//! ```
//!
//! `connect` hands the pending fields to the provisioning machine as one
//! announcement and completes the round. Fields are passed on as raw bytes;
//! validation happens when the machine decodes them.
//!
//! # Security Considerations
//!
//! Credentials travel as plaintext at the application layer. Provision in a
//! physically secure environment; anyone within BLE range can read the
//! exchange before pairing is complete.

use super::{ProvisioningTransport, TransportError};
use crate::config::{RawAnnouncement, BSSID_LEN, MAX_PASSWORD_LEN, MAX_SSID_LEN};
use crate::events::{EventSink, ProvisioningEvent};
use crate::network::ConnectionState;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{uuid128, BLEAdvertisementData, BLEDevice, BLEServer, NimbleProperties};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use zeroize::Zeroize;

const SERVICE_UUID: BleUuid = uuid128!("6a1d0000-5e3b-4f2c-9c1e-7d2f00c0ffee");
const STATUS_CHAR_UUID: BleUuid = uuid128!("6a1d0001-5e3b-4f2c-9c1e-7d2f00c0ffee");
const SSID_CHAR_UUID: BleUuid = uuid128!("6a1d0002-5e3b-4f2c-9c1e-7d2f00c0ffee");
const PASSWORD_CHAR_UUID: BleUuid = uuid128!("6a1d0003-5e3b-4f2c-9c1e-7d2f00c0ffee");
const BSSID_CHAR_UUID: BleUuid = uuid128!("6a1d0004-5e3b-4f2c-9c1e-7d2f00c0ffee");
const COMMAND_CHAR_UUID: BleUuid = uuid128!("6a1d0005-5e3b-4f2c-9c1e-7d2f00c0ffee");

/// Advertised device name.
const DEVICE_NAME: &str = "GardenLink";

/// Commands accepted on the command characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Connect,
    Clear,
}

impl Command {
    fn parse(data: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(data).ok()?;
        match text.trim_matches(char::from(0)).trim().to_ascii_lowercase().as_str() {
            "connect" => Some(Self::Connect),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }
}

type Pending = Arc<Mutex<RawAnnouncement>>;

fn lock(pending: &Pending) -> MutexGuard<'_, RawAnnouncement> {
    pending.lock().unwrap_or_else(|p| p.into_inner())
}

/// BLE [`ProvisioningTransport`].
pub struct BleProvisioning {
    pending: Pending,
}

impl BleProvisioning {
    /// Register the provisioning service on `server`.
    pub fn new(
        server: &mut BLEServer,
        events: EventSink,
        state: watch::Receiver<ConnectionState>,
    ) -> Self {
        let pending: Pending = Arc::new(Mutex::new(RawAnnouncement::default()));
        let service = server.create_service(SERVICE_UUID);

        let status_char = service
            .lock()
            .create_characteristic(STATUS_CHAR_UUID, NimbleProperties::READ);
        status_char.lock().on_read(move |char, _conn| {
            let current = *state.borrow();
            char.set_value(current.to_string().as_bytes());
        });

        let ssid = pending.clone();
        let ssid_char = service
            .lock()
            .create_characteristic(SSID_CHAR_UUID, NimbleProperties::WRITE);
        ssid_char.lock().on_write(move |args| {
            let data = args.recv_data();
            // Refuse before allocating; padding beyond the field size is not allowed either
            if data.len() > MAX_SSID_LEN {
                warn!("Rejected oversized SSID: {} bytes", data.len());
                return;
            }
            let mut pending = lock(&ssid);
            pending.ssid.zeroize();
            pending.ssid = data.to_vec();
        });

        let password = pending.clone();
        let password_char = service
            .lock()
            .create_characteristic(PASSWORD_CHAR_UUID, NimbleProperties::WRITE);
        password_char.lock().on_write(move |args| {
            let data = args.recv_data();
            if data.len() > MAX_PASSWORD_LEN {
                warn!("Rejected oversized password: {} bytes", data.len());
                return;
            }
            let mut pending = lock(&password);
            pending.password.zeroize();
            pending.password = data.to_vec();
        });

        let bssid = pending.clone();
        let bssid_char = service
            .lock()
            .create_characteristic(BSSID_CHAR_UUID, NimbleProperties::WRITE);
        bssid_char.lock().on_write(move |args| {
            let data = args.recv_data();
            let mut pending = lock(&bssid);
            // An empty write removes the pin. A wrong length is kept so decoding rejects it.
            pending.bssid = match data.len() {
                0 => None,
                BSSID_LEN => Some(data.to_vec()),
                len => {
                    warn!("BSSID write of {} bytes will be rejected", len);
                    Some(data.to_vec())
                }
            };
        });

        let command = pending.clone();
        let command_char = service
            .lock()
            .create_characteristic(COMMAND_CHAR_UUID, NimbleProperties::WRITE);
        command_char.lock().on_write(move |args| {
            match Command::parse(args.recv_data()) {
                Some(Command::Connect) => {
                    let mut pending = lock(&command);
                    let announcement = pending.clone();
                    pending.zeroize();
                    drop(pending);

                    info!("BLE connect command received");
                    events.emit(ProvisioningEvent::CredentialsAnnounced(announcement));
                    events.emit(ProvisioningEvent::RoundComplete);
                }
                Some(Command::Clear) => {
                    lock(&command).zeroize();
                    debug!("Pending BLE credentials cleared");
                }
                None => warn!("Unknown BLE command ignored"),
            }
        });

        Self { pending }
    }
}

impl ProvisioningTransport for BleProvisioning {
    fn start(&self) -> Result<(), TransportError> {
        let advertising = BLEDevice::take().get_advertising();
        advertising
            .lock()
            .set_data(
                BLEAdvertisementData::new()
                    .name(DEVICE_NAME)
                    .add_service_uuid(SERVICE_UUID),
            )
            .map_err(|e| TransportError::Ble(format!("{:?}", e)))?;
        advertising
            .lock()
            .start()
            .map_err(|e| TransportError::Ble(format!("{:?}", e)))?;
        debug!("BLE advertising as {}", DEVICE_NAME);
        Ok(())
    }

    fn stop(&self) {
        lock(&self.pending).zeroize();
        if let Err(e) = BLEDevice::take().get_advertising().lock().stop() {
            debug!("Stopping BLE advertising failed: {:?}", e);
        }
    }
}
