//! Host radio.
//!
//! On host systems, the OS handles networking. This radio stands in for the
//! station driver: it accepts any request and immediately reports the link
//! as associated and addressed, so the state machines can be exercised end
//! to end on a development machine.

use super::{CapabilityError, NetworkCapability};
use crate::config::Credentials;
use crate::events::{EventSink, LinkEvent};
use log::info;
use std::sync::Mutex;

/// Simulated station radio.
pub struct HostRadio {
    events: EventSink,
    /// SSID of the current association.
    associated: Mutex<Option<String>>,
    /// When set, only these SSIDs accept association.
    reachable: Option<Vec<String>>,
}

impl HostRadio {
    /// Create a radio that associates with any network.
    pub fn new(events: EventSink) -> Self {
        Self {
            events,
            associated: Mutex::new(None),
            reachable: None,
        }
    }

    /// Restrict association to the given SSIDs; others report `LinkDown`.
    pub fn with_reachable(mut self, ssids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.reachable = Some(ssids.into_iter().map(Into::into).collect());
        self
    }

    /// SSID of the current association.
    pub fn associated(&self) -> Option<String> {
        self.lock_associated().clone()
    }

    /// Simulate the access point going away.
    pub fn drop_link(&self) {
        if let Some(ssid) = self.lock_associated().take() {
            info!("Host radio lost {}", ssid);
            self.events.emit(LinkEvent::IpLost);
            self.events.emit(LinkEvent::LinkDown);
        }
    }

    fn is_reachable(&self, ssid: &str) -> bool {
        self.reachable
            .as_ref()
            .map_or(true, |list| list.iter().any(|s| s == ssid))
    }

    fn lock_associated(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        // A panic while holding the lock leaves a plain Option behind.
        self.associated
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NetworkCapability for HostRadio {
    fn disconnect(&self) -> Result<(), CapabilityError> {
        match self.lock_associated().take() {
            Some(_) => {
                self.events.emit(LinkEvent::LinkDown);
                Ok(())
            }
            None => Err(CapabilityError::Rejected("not associated".into())),
        }
    }

    fn apply_and_connect(&self, credentials: &Credentials) -> Result<(), CapabilityError> {
        if !self.is_reachable(credentials.ssid()) {
            info!("Host radio: {} not in range", credentials.ssid());
            self.events.emit(LinkEvent::LinkDown);
            return Ok(());
        }
        *self.lock_associated() = Some(credentials.ssid().to_string());
        self.events.emit(LinkEvent::LinkUp);
        self.events.emit(LinkEvent::IpAcquired);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{self, EventDispatcher, EventKind, NetEvent};
    use crate::testing::greenhouse;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_associates_and_reports_events() {
        let (sink, source) = events::channel();
        let mut dispatcher = EventDispatcher::new(source, 8);
        let mut link = dispatcher.subscribe("test", EventKind::LINK);
        dispatcher.spawn(CancellationToken::new());

        let radio = HostRadio::new(sink);
        assert!(radio.disconnect().is_err());
        radio.apply_and_connect(&greenhouse()).unwrap();
        assert_eq!(radio.associated().as_deref(), Some("Greenhouse"));
        radio.drop_link();
        assert_eq!(radio.associated(), None);

        assert_eq!(link.recv().await, Some(NetEvent::Link(LinkEvent::LinkUp)));
        assert_eq!(link.recv().await, Some(NetEvent::Link(LinkEvent::IpAcquired)));
        assert_eq!(link.recv().await, Some(NetEvent::Link(LinkEvent::IpLost)));
        assert_eq!(link.recv().await, Some(NetEvent::Link(LinkEvent::LinkDown)));
    }

    #[tokio::test]
    async fn test_unreachable_network_reports_link_down() {
        let (sink, source) = events::channel();
        let mut dispatcher = EventDispatcher::new(source, 8);
        let mut link = dispatcher.subscribe("test", EventKind::LINK);
        dispatcher.spawn(CancellationToken::new());

        let radio = HostRadio::new(sink).with_reachable(["Allotment"]);
        radio.apply_and_connect(&greenhouse()).unwrap();

        assert_eq!(radio.associated(), None);
        assert_eq!(link.recv().await, Some(NetEvent::Link(LinkEvent::LinkDown)));
    }
}
