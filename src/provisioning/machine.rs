//! Provisioning state machine.
//!
//! ```text
//! Listening ──announce──▶ Decoding ──ok──▶ Persisting ──▶ AwaitingConnect
//!     ▲                      │ malformed                        │
//!     └──────────────────────┴──────────────────────────────────┘
//! ```
//!
//! The machine never waits for the link to come up: once the connect
//! request is issued it is back in `Listening`, so a corrected announcement
//! can follow immediately. The transport is restarted after every completed
//! round and whenever a round sits idle past its timeout, trading spurious
//! restarts for never wedging on a stalled protocol.

use super::ProvisioningTransport;
use crate::config::{ConnectivitySettings, Credentials, RawAnnouncement};
use crate::events::{NetEvent, ProvisioningEvent, Subscription};
use crate::network::ConnectionManager;
use crate::persistence::CredentialStore;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Roughly 30 years: an idle timeout that never fires in practice.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + timeout`, clamped for timeouts too large to represent.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Where the machine is in handling an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningPhase {
    Listening,
    Decoding,
    Persisting,
    AwaitingConnect,
}

/// One run of the provisioning protocol, from transport start to round completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningSession {
    started_at: Instant,
    complete: bool,
}

impl ProvisioningSession {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            complete: false,
        }
    }

    /// When the transport was (re)started for this session.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Whether the transport signalled the round as finished.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Receives announced credentials, persists them and triggers a connect.
pub struct ProvisioningStateMachine {
    transport: Arc<dyn ProvisioningTransport>,
    store: Arc<dyn CredentialStore>,
    manager: Arc<ConnectionManager>,
    events: Subscription,
    restart_delay: Duration,
    round_timeout: Duration,
    phase: ProvisioningPhase,
    session: Option<ProvisioningSession>,
}

impl ProvisioningStateMachine {
    /// Create a machine fed by `events` (provisioning kinds only).
    pub fn new(
        transport: Arc<dyn ProvisioningTransport>,
        store: Arc<dyn CredentialStore>,
        manager: Arc<ConnectionManager>,
        events: Subscription,
        settings: &ConnectivitySettings,
    ) -> Self {
        Self {
            transport,
            store,
            manager,
            events,
            restart_delay: settings.provisioning_restart_delay,
            round_timeout: settings.provisioning_round_timeout,
            phase: ProvisioningPhase::Listening,
            session: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ProvisioningPhase {
        self.phase
    }

    /// Session of the currently running transport, if started.
    pub fn session(&self) -> Option<&ProvisioningSession> {
        self.session.as_ref()
    }

    /// Run until cancelled. The transport is stopped on exit.
    pub async fn run(mut self, cancel: CancellationToken) {
        self.start_session();
        let idle = sleep(self.round_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = &mut idle => {
                    info!("Provisioning round idle for {:?}, restarting transport", self.round_timeout);
                    if !self.restart(&cancel).await {
                        break;
                    }
                }
                event = self.events.recv() => match event {
                    Some(NetEvent::Provisioning(ProvisioningEvent::CredentialsAnnounced(raw))) => {
                        self.handle_announcement(&raw).await;
                    }
                    Some(NetEvent::Provisioning(ProvisioningEvent::RoundComplete)) => {
                        info!("Provisioning round complete");
                        if let Some(session) = self.session.as_mut() {
                            session.complete = true;
                        }
                        if !self.restart(&cancel).await {
                            break;
                        }
                    }
                    Some(NetEvent::Link(_)) => continue,
                    None => break,
                },
            }
            idle.as_mut().reset(deadline_after(self.round_timeout));
        }

        self.transport.stop();
        self.session = None;
        debug!("Provisioning stopped");
    }

    /// Decode, persist and apply one announcement.
    ///
    /// Returns the credentials a connect was issued for, or `None` if the
    /// announcement was malformed. Persistence and connect failures are
    /// logged and absorbed.
    pub async fn handle_announcement(&mut self, raw: &RawAnnouncement) -> Option<Credentials> {
        self.phase = ProvisioningPhase::Decoding;
        let credentials = match raw.decode() {
            Ok(creds) => creds,
            Err(e) => {
                warn!("Discarding malformed announcement {:?}: {}", raw, e);
                self.phase = ProvisioningPhase::Listening;
                return None;
            }
        };
        info!("Got SSID and password for {}", credentials.ssid());

        self.phase = ProvisioningPhase::Persisting;
        if let Err(e) = self.store.save(&credentials) {
            warn!(
                "Failed to persist credentials ({}); connecting with them anyway",
                e
            );
        }

        self.phase = ProvisioningPhase::AwaitingConnect;
        if let Err(e) = self.manager.connect(credentials.clone()).await {
            warn!("Provisioned connect request failed: {}", e);
        }

        self.phase = ProvisioningPhase::Listening;
        Some(credentials)
    }

    /// Stop the transport, pause, start it again. Returns `false` if cancelled meanwhile.
    async fn restart(&mut self, cancel: &CancellationToken) -> bool {
        self.transport.stop();
        self.session = None;
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = sleep(self.restart_delay) => {}
        }
        self.start_session();
        true
    }

    fn start_session(&mut self) {
        match self.transport.start() {
            Ok(()) => {
                debug!("Provisioning transport started");
                self.session = Some(ProvisioningSession::new());
            }
            // Retried when the idle timer fires.
            Err(e) => warn!("Failed to start provisioning transport: {}", e),
        }
    }
}
