//! The single choke-point for connection attempts.
//!
//! Provisioning and the reconnection supervisor both call
//! [`ConnectionManager::connect`]. The disconnect/apply/connect sequence runs
//! inside one scoped lock, so two requests never interleave their
//! configuration writes. The lock covers the *request* only; association
//! completes asynchronously and is folded into [`ConnectionState`] by
//! [`ConnectionManager::track_link_events`].
//!
//! Dropping a live association to make room for a new request raises a
//! `LinkDown` of its own. That one event is absorbed so the new attempt
//! stays `Connecting` instead of looking like a lost link.

use super::{CapabilityError, NetworkCapability};
use crate::config::Credentials;
use crate::events::{LinkEvent, NetEvent, Subscription};
use log::{debug, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

/// Connection state as seen by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No attempt made since start.
    Idle,
    /// A connect request was issued and has not yet produced an address.
    Connecting,
    /// Associated and addressed.
    Connected,
    /// Association or address lost, or the last request failed.
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Failure of a connect request.
#[derive(Debug)]
pub enum ConnectError {
    /// The radio rejected the request synchronously. Not retried here.
    CapabilityFailure(CapabilityError),
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapabilityFailure(e) => write!(f, "capability failure: {}", e),
        }
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CapabilityFailure(e) => Some(e),
        }
    }
}

impl From<CapabilityError> for ConnectError {
    fn from(e: CapabilityError) -> Self {
        Self::CapabilityFailure(e)
    }
}

/// Serializes connection attempts and owns [`ConnectionState`].
pub struct ConnectionManager {
    capability: Arc<dyn NetworkCapability>,
    /// Held across disconnect/apply/connect of one request.
    connect_lock: Mutex<()>,
    /// Only this manager writes; everyone else holds a receiver.
    state: watch::Sender<ConnectionState>,
    /// Link events last reported an association.
    associated: AtomicBool,
    /// A pre-connect disconnect dropped a live association and its
    /// `LinkDown` has not arrived yet.
    expect_own_link_down: AtomicBool,
}

impl ConnectionManager {
    /// Create a manager driving `capability`. Starts in [`ConnectionState::Idle`].
    pub fn new(capability: Arc<dyn NetworkCapability>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            capability,
            connect_lock: Mutex::new(()),
            state,
            associated: AtomicBool::new(false),
            expect_own_link_down: AtomicBool::new(false),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Read-only observer of the connection state.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Request association with `credentials`.
    ///
    /// Callers queue on the lock rather than racing; every call issues its
    /// own attempt, so the most recent call's credentials win. Returns once
    /// the request was issued, not once the link is up.
    pub async fn connect(&self, credentials: Credentials) -> Result<(), ConnectError> {
        let _guard = self.connect_lock.lock().await;
        // Armed before the request: the radio may report the loss before
        // disconnect() returns.
        self.expect_own_link_down
            .store(self.associated.load(Ordering::SeqCst), Ordering::SeqCst);
        self.transition(ConnectionState::Connecting);

        info!("Connecting to WiFi: {}", credentials.ssid());
        if let Err(e) = self.capability.disconnect() {
            // Usually "not associated"; the new request supersedes it anyway.
            debug!("Disconnect before reconnect failed: {}", e);
            self.expect_own_link_down.store(false, Ordering::SeqCst);
        }

        if let Err(e) = self.capability.apply_and_connect(&credentials) {
            warn!("Connect request for {} rejected: {}", credentials.ssid(), e);
            self.transition(ConnectionState::Disconnected);
            return Err(e.into());
        }
        Ok(())
    }

    /// Drop the current association.
    pub async fn disconnect(&self) -> Result<(), ConnectError> {
        let _guard = self.connect_lock.lock().await;
        info!("Disconnecting from WiFi");
        self.expect_own_link_down.store(false, Ordering::SeqCst);
        self.capability.disconnect()?;
        self.transition(ConnectionState::Disconnected);
        Ok(())
    }

    /// Fold a link event into the connection state.
    pub fn apply_link_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::IpAcquired => {
                self.associated.store(true, Ordering::SeqCst);
                self.expect_own_link_down.store(false, Ordering::SeqCst);
                self.transition(ConnectionState::Connected)
            }
            LinkEvent::LinkDown | LinkEvent::IpLost => {
                if event == LinkEvent::LinkDown {
                    self.associated.store(false, Ordering::SeqCst);
                }
                if self.expect_own_link_down.load(Ordering::SeqCst) {
                    if event == LinkEvent::LinkDown {
                        self.expect_own_link_down.store(false, Ordering::SeqCst);
                    }
                    debug!("{:?} from the pre-connect disconnect, attempt still pending", event);
                    return;
                }
                self.transition(ConnectionState::Disconnected)
            }
            // Associated but not yet addressed.
            LinkEvent::LinkUp => {
                self.associated.store(true, Ordering::SeqCst);
                self.expect_own_link_down.store(false, Ordering::SeqCst);
                if self.state() != ConnectionState::Connected {
                    self.transition(ConnectionState::Connecting);
                }
            }
        }
    }

    /// Consume link events until cancelled or the dispatcher stops.
    pub async fn track_link_events(&self, mut events: Subscription, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Some(NetEvent::Link(link)) => {
                    debug!("Link event: {:?}", link);
                    self.apply_link_event(link);
                }
                Some(NetEvent::Provisioning(_)) => {}
                None => break,
            }
        }
        debug!("Link event tracker stopped");
    }

    fn transition(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            info!("Connection state: {} -> {}", current, next);
            *current = next;
            true
        });
    }
}
