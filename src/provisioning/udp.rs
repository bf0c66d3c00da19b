//! JSON-over-UDP provisioning transport for host builds.
//!
//! Stands in for the BLE service when running on a development machine.
//! A companion sends one datagram per round:
//!
//! ```text
//! {"ssid": "Greenhouse", "password": "hunter2", "bssid": "a4:cf:12:00:be:ef"}
//! ```
//!
//! and receives `ack` once the announcement has been handed to the
//! provisioning machine, or `nack` if the datagram was not valid JSON.
//! Field validation happens downstream, so an `ack` does not mean the
//! credentials were accepted.

use super::{ProvisioningTransport, TransportError};
use crate::config::{Bssid, RawAnnouncement};
use crate::events::{EventSink, ProvisioningEvent};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default listening address.
pub const DEFAULT_PROVISION_ADDR: &str = "0.0.0.0:7878";

/// Reply to a datagram that was handed on.
pub const ACK: &[u8] = b"ack";

/// Reply to a datagram that could not be parsed.
pub const NACK: &[u8] = b"nack";

/// Large enough for the longest SSID, password and BSSID plus JSON framing.
const MAX_DATAGRAM: usize = 512;

/// Announcement as carried on the wire.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct WireAnnouncement {
    pub ssid: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bssid: Option<String>,
}

impl WireAnnouncement {
    /// Convert to the transport-neutral form.
    ///
    /// An unparseable BSSID is passed on as an empty one so decoding
    /// rejects the announcement instead of silently dropping the pin.
    pub fn to_raw(&self) -> RawAnnouncement {
        let raw = RawAnnouncement::new(self.ssid.as_bytes(), self.password.as_bytes());
        match &self.bssid {
            Some(text) => match text.parse::<Bssid>() {
                Ok(bssid) => raw.with_bssid(bssid.octets().to_vec()),
                Err(_) => raw.with_bssid(Vec::new()),
            },
            None => raw,
        }
    }
}

/// UDP [`ProvisioningTransport`].
pub struct UdpProvisioning {
    addr: SocketAddr,
    events: EventSink,
    listener: Mutex<Option<Listener>>,
}

struct Listener {
    cancel: CancellationToken,
    local_addr: SocketAddr,
}

impl UdpProvisioning {
    /// Listen on `addr` once started, raising events into `events`.
    pub fn new(addr: SocketAddr, events: EventSink) -> Self {
        Self {
            addr,
            events,
            listener: Mutex::new(None),
        }
    }

    /// Address actually bound while running. Useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock().as_ref().map(|l| l.local_addr)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Listener>> {
        self.listener.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl ProvisioningTransport for UdpProvisioning {
    /// Bind and spawn the listener. Must be called from within a tokio runtime.
    fn start(&self) -> Result<(), TransportError> {
        let mut listener = self.lock();
        if listener.is_some() {
            return Ok(());
        }

        let socket = std::net::UdpSocket::bind(self.addr)?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket)?;
        let local_addr = socket.local_addr()?;

        let cancel = CancellationToken::new();
        tokio::spawn(listen(socket, self.events.clone(), cancel.clone()));
        info!("Provisioning listening on udp://{}", local_addr);

        *listener = Some(Listener { cancel, local_addr });
        Ok(())
    }

    fn stop(&self) {
        if let Some(listener) = self.lock().take() {
            listener.cancel.cancel();
            debug!("Provisioning listener on {} stopped", listener.local_addr);
        }
    }
}

impl Drop for UdpProvisioning {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn listen(socket: UdpSocket, events: EventSink, cancel: CancellationToken) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let (len, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    warn!("Provisioning receive failed: {}", e);
                    continue;
                }
            },
        };

        let parsed = serde_json::from_slice::<WireAnnouncement>(&buf[..len]);
        buf[..len].zeroize();

        let reply = match parsed {
            Ok(wire) => {
                info!("Announcement received from {}", peer);
                events.emit(ProvisioningEvent::CredentialsAnnounced(wire.to_raw()));
                ACK
            }
            Err(e) => {
                warn!("Ignoring unparseable announcement from {}: {}", peer, e);
                NACK
            }
        };

        if let Err(e) = socket.send_to(reply, peer).await {
            warn!("Failed to reply to {}: {}", peer, e);
        }
        if reply == ACK {
            events.emit(ProvisioningEvent::RoundComplete);
        }
    }
}
