//! ESP32 WiFi station radio.
//!
//! Wraps the ESP-IDF WiFi driver in non-blocking mode: requests return as
//! soon as the driver accepts them, and association progress is forwarded
//! from the system event loop as link events.

use super::{CapabilityError, NetworkCapability};
use crate::config::Credentials;
use crate::events::{EventSink, LinkEvent};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent};
use esp_idf_sys::EspError;
use log::info;
use std::sync::Mutex;

struct Inner {
    wifi: EspWifi<'static>,
    /// Kept alive for as long as the radio exists.
    _subscriptions: Vec<EspSubscription<'static, System>>,
}

/// ESP-IDF backed [`NetworkCapability`].
pub struct EspRadio {
    inner: Mutex<Inner>,
}

impl EspRadio {
    /// Initialise the driver in station mode and start forwarding events.
    ///
    /// Failure here means no networking is possible at all.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        events: EventSink,
    ) -> Result<Self, EspError> {
        let mut wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;
        wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
        wifi.start()?;
        info!("WiFi driver started");

        let link_events = events.clone();
        let wifi_subscription = sysloop.subscribe::<WifiEvent, _>(move |event| match event {
            WifiEvent::StaConnected(..) => {
                link_events.emit(LinkEvent::LinkUp);
            }
            WifiEvent::StaDisconnected(..) => {
                link_events.emit(LinkEvent::LinkDown);
            }
            _ => {}
        })?;

        let ip_subscription = sysloop.subscribe::<IpEvent, _>(move |event| match event {
            IpEvent::DhcpIpAssigned(..) => {
                events.emit(LinkEvent::IpAcquired);
            }
            IpEvent::DhcpIpDeassigned(..) => {
                events.emit(LinkEvent::IpLost);
            }
            _ => {}
        })?;

        Ok(Self {
            inner: Mutex::new(Inner {
                wifi,
                _subscriptions: vec![wifi_subscription, ip_subscription],
            }),
        })
    }

    fn with_wifi<T>(
        &self,
        f: impl FnOnce(&mut EspWifi<'static>) -> Result<T, CapabilityError>,
    ) -> Result<T, CapabilityError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| CapabilityError::Rejected("driver lock poisoned".into()))?;
        f(&mut inner.wifi)
    }
}

impl NetworkCapability for EspRadio {
    fn disconnect(&self) -> Result<(), CapabilityError> {
        self.with_wifi(|wifi| {
            wifi.disconnect()?;
            Ok(())
        })
    }

    fn apply_and_connect(&self, credentials: &Credentials) -> Result<(), CapabilityError> {
        let auth_method = if credentials.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let config = Configuration::Client(ClientConfiguration {
            ssid: credentials
                .ssid()
                .try_into()
                .map_err(|_| CapabilityError::InvalidSsid)?,
            password: credentials
                .password()
                .try_into()
                .map_err(|_| CapabilityError::InvalidPassword)?,
            bssid: credentials.bssid().map(|b| b.octets()),
            auth_method,
            ..Default::default()
        });

        self.with_wifi(|wifi| {
            wifi.set_configuration(&config)?;
            wifi.connect()?;
            Ok(())
        })
    }
}
