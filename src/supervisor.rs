//! Reconnection supervisor.
//!
//! Keeps the device online without operator intervention:
//!
//! ```text
//! WaitForDisconnect ──idle/disconnected──▶ LoadCredentials ──found──▶ Connect
//!        ▲                                    │ empty: park              │
//!        ├────────── park elapsed ────────────┘                          ▼
//!        ├────────── Connected seen ──────────────────────────────── Backoff
//!        │                                    ▲                          │
//!        │                                    └── still not connected ───┘
//! ```
//!
//! The first attempt after a disconnect is immediate; the backoff spaces out
//! the attempts that follow. An attempt still `Connecting` when its backoff
//! runs out is retried. Attempts issued by provisioning are left alone until
//! they fail. The supervisor never invents credentials: with an empty store
//! it parks and looks again later.

use crate::config::{ConnectivitySettings, Credentials};
use crate::network::{ConnectionManager, ConnectionState};
use crate::persistence::CredentialStore;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Capped exponential retry delay.
///
/// With `min == max` this degenerates to a fixed retry interval, which is
/// the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectBackoff {
    min: Duration,
    max: Duration,
    multiplier: u32,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(min: Duration, max: Duration, multiplier: u32) -> Self {
        Self {
            min,
            max: max.max(min),
            multiplier: multiplier.max(1),
            current: min,
        }
    }

    pub fn from_settings(settings: &ConnectivitySettings) -> Self {
        Self::new(
            settings.reconnect_backoff_min,
            settings.reconnect_backoff_max,
            settings.backoff_multiplier,
        )
    }

    /// Delay before the next attempt. Advances the backoff towards the ceiling.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(self.multiplier).min(self.max);
        delay
    }

    /// Back to the minimum. Called once a connection succeeds.
    pub fn reset(&mut self) {
        self.current = self.min;
    }

    /// Delay [`next_delay`](Self::next_delay) would return.
    pub fn current(&self) -> Duration {
        self.current
    }
}

/// Supervisor states.
#[derive(Debug)]
enum Step {
    WaitForDisconnect,
    LoadCredentials,
    Connect(Credentials),
    Backoff,
}

/// Restores connectivity from persisted credentials.
pub struct ReconnectionSupervisor {
    manager: Arc<ConnectionManager>,
    store: Arc<dyn CredentialStore>,
    backoff: ReconnectBackoff,
    park_interval: Duration,
}

impl ReconnectionSupervisor {
    pub fn new(
        manager: Arc<ConnectionManager>,
        store: Arc<dyn CredentialStore>,
        settings: &ConnectivitySettings,
    ) -> Self {
        Self {
            manager,
            store,
            backoff: ReconnectBackoff::from_settings(settings),
            park_interval: settings.credential_park_interval,
        }
    }

    /// Run until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut state = self.manager.watch();
        let mut step = Step::WaitForDisconnect;

        loop {
            step = match step {
                Step::WaitForDisconnect => {
                    if *state.borrow_and_update() == ConnectionState::Connected {
                        self.backoff.reset();
                    }
                    let observed = tokio::select! {
                        _ = cancel.cancelled() => break,
                        observed = async {
                            state
                                .wait_for(|s| {
                                    matches!(s, ConnectionState::Idle | ConnectionState::Disconnected)
                                })
                                .await
                                .map(|s| *s)
                        } => observed,
                    };
                    match observed {
                        Ok(current) => {
                            debug!("Supervisor woke with connection {}", current);
                            Step::LoadCredentials
                        }
                        Err(_) => break,
                    }
                }

                Step::LoadCredentials => match self.store.load() {
                    Some(credentials) => Step::Connect(credentials),
                    None => {
                        debug!(
                            "No stored credentials, checking again in {:?}",
                            self.park_interval
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = sleep(self.park_interval) => {}
                        }
                        Step::WaitForDisconnect
                    }
                },

                Step::Connect(credentials) => {
                    info!("Reconnecting to {}", credentials.ssid());
                    if let Err(e) = self.manager.connect(credentials).await {
                        warn!("Reconnect attempt failed: {}", e);
                    }
                    Step::Backoff
                }

                Step::Backoff => {
                    let delay = self.backoff.next_delay();
                    debug!("Next reconnect attempt in {:?}", delay);
                    let restored = tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(delay) => false,
                        connected = async {
                            state
                                .wait_for(|s| *s == ConnectionState::Connected)
                                .await
                                .is_ok()
                        } => {
                            if !connected {
                                break;
                            }
                            true
                        }
                    };
                    if restored {
                        info!("Connection restored");
                        self.backoff.reset();
                        Step::WaitForDisconnect
                    } else if *state.borrow() == ConnectionState::Connected {
                        Step::WaitForDisconnect
                    } else {
                        Step::LoadCredentials
                    }
                }
            };
        }

        debug!("Reconnection supervisor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LinkEvent;
    use crate::persistence::MemoryStore;
    use crate::testing::{greenhouse, RecordingRadio};

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn setup(
        store: Arc<MemoryStore>,
        settings: &ConnectivitySettings,
    ) -> (Arc<RecordingRadio>, Arc<ConnectionManager>, ReconnectionSupervisor) {
        let radio = Arc::new(RecordingRadio::new());
        let manager = Arc::new(ConnectionManager::new(radio.clone()));
        let supervisor = ReconnectionSupervisor::new(manager.clone(), store, settings);
        (radio, manager, supervisor)
    }

    #[test]
    fn test_default_backoff_is_fixed() {
        let mut backoff = ReconnectBackoff::from_settings(&ConnectivitySettings::default());
        assert_eq!(backoff.next_delay(), secs(10));
        assert_eq!(backoff.next_delay(), secs(10));
        assert_eq!(backoff.next_delay(), secs(10));
    }

    #[test]
    fn test_backoff_grows_to_ceiling_and_resets() {
        let mut backoff = ReconnectBackoff::new(secs(1), secs(8), 2);
        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay()).collect();
        assert_eq!(delays, vec![secs(1), secs(2), secs(4), secs(8), secs(8), secs(8)]);

        backoff.reset();
        assert_eq!(backoff.current(), secs(1));
    }

    #[test]
    fn test_backoff_sanitizes_parameters() {
        let mut backoff = ReconnectBackoff::new(secs(5), secs(1), 0);
        assert_eq!(backoff.next_delay(), secs(5));
        assert_eq!(backoff.next_delay(), secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_store_parks_without_connecting() {
        let store = Arc::new(MemoryStore::new());
        let settings = ConnectivitySettings::default();
        let (radio, _manager, supervisor) = setup(store.clone(), &settings);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        sleep(secs(120)).await;
        assert!(radio.calls().is_empty());

        // Picked up on the next look at the store.
        store.save(&greenhouse()).unwrap();
        sleep(settings.credential_park_interval + Duration::from_millis(10)).await;
        assert_eq!(radio.apply_count(), 1);
        assert_eq!(radio.last_applied().as_deref(), Some("Greenhouse"));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_down_reconnects_once_within_interval() {
        let store = Arc::new(MemoryStore::with(greenhouse()));
        let (radio, manager, supervisor) = setup(store, &ConnectivitySettings::default());
        manager.apply_link_event(LinkEvent::IpAcquired);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        sleep(Duration::from_millis(10)).await;
        assert_eq!(radio.apply_count(), 0);

        manager.apply_link_event(LinkEvent::LinkDown);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(radio.apply_count(), 1);
        assert_eq!(radio.last_applied().as_deref(), Some("Greenhouse"));

        sleep(secs(9)).await;
        assert_eq!(radio.apply_count(), 1);

        // Still down after the fixed interval: try again.
        sleep(secs(1)).await;
        assert_eq!(radio.apply_count(), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_resets_backoff() {
        let settings = ConnectivitySettings {
            reconnect_backoff_min: secs(1),
            reconnect_backoff_max: secs(8),
            ..Default::default()
        };
        let store = Arc::new(MemoryStore::with(greenhouse()));
        let (radio, manager, supervisor) = setup(store, &settings);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        // Attempts at 0s, 1s, 3s and 7s while the network stays away.
        sleep(Duration::from_millis(10)).await;
        assert_eq!(radio.apply_count(), 1);
        sleep(secs(7)).await;
        assert_eq!(radio.apply_count(), 4);

        manager.apply_link_event(LinkEvent::IpAcquired);
        sleep(secs(20)).await;
        assert_eq!(radio.apply_count(), 4);

        manager.apply_link_event(LinkEvent::LinkDown);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(radio.apply_count(), 5);
        sleep(secs(1)).await;
        assert_eq!(radio.apply_count(), 6);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_in_progress_left_alone() {
        let store = Arc::new(MemoryStore::with(greenhouse()));
        let (radio, manager, supervisor) = setup(store, &ConnectivitySettings::default());
        manager.apply_link_event(LinkEvent::IpAcquired);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        // As provisioning would: a fresh request while the link is up.
        let allotment = Credentials::new("Allotment", "").unwrap();
        manager.connect(allotment).await.unwrap();
        sleep(secs(60)).await;
        assert_eq!(radio.apply_count(), 1);

        // It failed after all; now the supervisor steps in.
        manager.apply_link_event(LinkEvent::LinkDown);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(radio.apply_count(), 2);
        assert_eq!(radio.last_applied().as_deref(), Some("Greenhouse"));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_is_retried_after_backoff() {
        let store = Arc::new(MemoryStore::with(greenhouse()));
        let (radio, manager, supervisor) = setup(store, &ConnectivitySettings::default());
        radio.fail_next_apply();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        sleep(Duration::from_millis(10)).await;
        assert_eq!(radio.apply_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        sleep(secs(10)).await;
        assert_eq!(radio.apply_count(), 2);
        assert_eq!(manager.state(), ConnectionState::Connecting);

        cancel.cancel();
        task.await.unwrap();
    }
}
