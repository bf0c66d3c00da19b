//! Wiring of the connectivity core.
//!
//! [`Connectivity::start`] spawns four background tasks that share one
//! cancellation token:
//!
//! 1. the event dispatcher
//! 2. the link tracker, folding link events into [`ConnectionState`]
//! 3. the provisioning state machine
//! 4. the reconnection supervisor
//!
//! Dropping the handle cancels all of them.

use crate::config::{ConnectivitySettings, SettingsError};
use crate::events::{EventDispatcher, EventKind, EventSource};
use crate::network::{CapabilityError, ConnectionManager, ConnectionState, NetworkCapability};
use crate::persistence::{CredentialStore, StoreError};
use crate::provisioning::{ProvisioningStateMachine, ProvisioningTransport, TransportError};
use crate::supervisor::ReconnectionSupervisor;
use log::{info, warn};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Failure to bring up the connectivity core. Fatal: without a radio there
/// is nothing left to retry, so the caller restarts the device.
#[derive(Debug)]
pub enum InitError {
    Capability(CapabilityError),
    Store(StoreError),
    Transport(TransportError),
    Settings(SettingsError),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capability(e) => write!(f, "network capability failed to initialize: {}", e),
            Self::Store(e) => write!(f, "credential store failed to initialize: {}", e),
            Self::Transport(e) => write!(f, "provisioning transport failed to initialize: {}", e),
            Self::Settings(e) => write!(f, "invalid settings: {}", e),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Capability(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Transport(e) => Some(e),
            Self::Settings(e) => Some(e),
        }
    }
}

impl From<CapabilityError> for InitError {
    fn from(e: CapabilityError) -> Self {
        Self::Capability(e)
    }
}

impl From<StoreError> for InitError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<TransportError> for InitError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<SettingsError> for InitError {
    fn from(e: SettingsError) -> Self {
        Self::Settings(e)
    }
}

/// Handle to the running connectivity core.
pub struct Connectivity {
    manager: Arc<ConnectionManager>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Connectivity {
    /// Start everything, draining events from `events`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        capability: Arc<dyn NetworkCapability>,
        transport: Arc<dyn ProvisioningTransport>,
        store: Arc<dyn CredentialStore>,
        events: EventSource,
        settings: ConnectivitySettings,
    ) -> Result<Self, InitError> {
        let manager = Arc::new(ConnectionManager::new(capability));
        let dispatcher = EventDispatcher::new(events, settings.subscriber_capacity);
        Self::with_dispatcher(manager, transport, store, dispatcher, settings)
    }

    /// Like [`start`](Self::start), with a manager built by the caller (so
    /// the transport can report its state) and a dispatcher that may already
    /// carry subscriptions for other consumers of network events.
    pub fn with_dispatcher(
        manager: Arc<ConnectionManager>,
        transport: Arc<dyn ProvisioningTransport>,
        store: Arc<dyn CredentialStore>,
        mut dispatcher: EventDispatcher,
        settings: ConnectivitySettings,
    ) -> Result<Self, InitError> {
        settings.validate()?;

        let cancel = CancellationToken::new();
        let link_events = dispatcher.subscribe("connection-manager", EventKind::LINK);
        let provisioning_events = dispatcher.subscribe("provisioning", EventKind::PROVISIONING);

        let machine = ProvisioningStateMachine::new(
            transport,
            store.clone(),
            manager.clone(),
            provisioning_events,
            &settings,
        );
        let supervisor = ReconnectionSupervisor::new(manager.clone(), store, &settings);

        let tracker = {
            let manager = manager.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { manager.track_link_events(link_events, cancel).await })
        };
        let tasks = vec![
            dispatcher.spawn(cancel.clone()),
            tracker,
            tokio::spawn(machine.run(cancel.clone())),
            tokio::spawn(supervisor.run(cancel.clone())),
        ];

        info!("Connectivity started");
        Ok(Self {
            manager,
            cancel,
            tasks,
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Observe connection state changes.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.manager.watch()
    }

    /// The connection manager, for callers that connect on their own.
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!("Connectivity task ended abnormally: {}", e);
            }
        }
        info!("Connectivity stopped");
    }
}

impl Drop for Connectivity {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
