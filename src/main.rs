//! Garden Link device binary.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `cargo run` - simulated radio, UDP provisioning on
//!   `GARDEN_LINK_PROVISION_ADDR` (default `0.0.0.0:7878`), credentials in
//!   `GARDEN_LINK_STORE` (default `~/.garden-link/credentials.json`)
//! - **ESP32**: `cargo espflash flash --features esp32 --release` - WiFi
//!   station, BLE provisioning, credentials in NVS
//!
//! Provision a host node with `cargo run --bin announce-credentials`.

use garden_link::events::{self, EventSink, EventSource};
use garden_link::{Connectivity, ConnectionState, ConnectivitySettings, InitError};
use log::{error, info};

/// Delay before restarting the chip after a fatal initialisation error.
#[cfg(feature = "esp32")]
const RESTART_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(feature = "esp32")]
fn start(
    sink: EventSink,
    source: EventSource,
    settings: ConnectivitySettings,
) -> Result<Connectivity, InitError> {
    use esp32_nimble::BLEDevice;
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use garden_link::network::{CapabilityError, EspRadio};
    use garden_link::persistence::{NvsStore, StoreError};
    use garden_link::provisioning::BleProvisioning;
    use garden_link::{ConnectionManager, EventDispatcher};
    use std::sync::Arc;

    let peripherals = Peripherals::take().map_err(CapabilityError::from)?;
    let sysloop = EspSystemEventLoop::take().map_err(CapabilityError::from)?;
    let partition = EspDefaultNvsPartition::take().map_err(StoreError::from)?;

    let store = NvsStore::new(partition.clone()).map_err(StoreError::from)?;
    let radio = EspRadio::new(peripherals.modem, sysloop, Some(partition), sink.clone())
        .map_err(CapabilityError::from)?;
    let manager = Arc::new(ConnectionManager::new(Arc::new(radio)));

    let server = BLEDevice::take().get_server();
    let ble = BleProvisioning::new(server, sink, manager.watch());

    let dispatcher = EventDispatcher::new(source, settings.subscriber_capacity);
    Connectivity::with_dispatcher(manager, Arc::new(ble), Arc::new(store), dispatcher, settings)
}

#[cfg(not(feature = "esp32"))]
fn start(
    sink: EventSink,
    source: EventSource,
    settings: ConnectivitySettings,
) -> Result<Connectivity, InitError> {
    use garden_link::network::HostRadio;
    use garden_link::persistence::{default_store_path, FileStore, StoreError};
    use garden_link::provisioning::{UdpProvisioning, DEFAULT_PROVISION_ADDR};
    use garden_link::TransportError;
    use std::io;
    use std::net::SocketAddr;
    use std::sync::Arc;

    let store_path = match std::env::var("GARDEN_LINK_STORE") {
        Ok(path) => path.into(),
        Err(_) => default_store_path().map_err(StoreError::from)?,
    };
    info!("Credential store: {}", store_path.display());

    let addr_text = std::env::var("GARDEN_LINK_PROVISION_ADDR")
        .unwrap_or_else(|_| DEFAULT_PROVISION_ADDR.to_string());
    let addr: SocketAddr = addr_text.parse().map_err(|e| {
        TransportError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("bad provisioning address {}: {}", addr_text, e),
        ))
    })?;

    let radio = HostRadio::new(sink.clone());
    let udp = UdpProvisioning::new(addr, sink);
    Connectivity::start(
        Arc::new(radio),
        Arc::new(udp),
        Arc::new(FileStore::new(store_path)),
        source,
        settings,
    )
}

/// No networking is possible: restart and hope the hardware recovers.
fn fatal(e: InitError) -> ! {
    error!("Initialization failed: {}", e);

    #[cfg(feature = "esp32")]
    {
        error!("Restarting in {:?}", RESTART_DELAY);
        std::thread::sleep(RESTART_DELAY);
        esp_idf_hal::reset::restart();
    }

    #[cfg(not(feature = "esp32"))]
    std::process::exit(1);
}

#[cfg(not(feature = "esp32"))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

// The device runs until power is lost.
#[cfg(feature = "esp32")]
async fn shutdown_signal() {
    std::future::pending::<()>().await;
}

#[cfg_attr(feature = "esp32", tokio::main(flavor = "current_thread"))]
#[cfg_attr(not(feature = "esp32"), tokio::main(flavor = "multi_thread"))]
async fn main() {
    platform_init();

    info!("=== Garden Link starting ===");

    #[cfg(feature = "esp32")]
    info!("Platform: ESP32");
    #[cfg(not(feature = "esp32"))]
    info!("Platform: Host");

    let settings = ConnectivitySettings::from_env();
    let (sink, source) = events::channel();
    let link = match start(sink, source, settings) {
        Ok(link) => link,
        Err(e) => fatal(e),
    };

    let mut state = link.watch();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down...");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                if *state.borrow_and_update() == ConnectionState::Connected {
                    info!("Network ready");
                }
            }
        }
    }

    link.shutdown().await;
    info!("Shutdown complete");
}
