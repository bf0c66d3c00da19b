//! Test doubles shared by the unit tests.
//!
//! Compiled only for `cargo test`; production builds never include them.
//!
//! - [`RecordingRadio`] - records every radio request, can inject failures
//!   and delays, and optionally reports its link like a real station
//! - [`RecordingTransport`] - counts provisioning transport starts and stops
//! - [`FailingStore`] - a credential store whose writes always fail

use crate::config::Credentials;
use crate::events::{EventSink, LinkEvent};
use crate::network::{CapabilityError, NetworkCapability};
use crate::persistence::{CredentialStore, StoreError};
use crate::provisioning::{ProvisioningTransport, TransportError};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// The credentials most scenarios revolve around.
pub fn greenhouse() -> Credentials {
    Credentials::new("Greenhouse", "hunter2").expect("valid test credentials")
}

/// A request observed by [`RecordingRadio`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Disconnect,
    Apply(String),
}

/// Fake [`NetworkCapability`] that records requests.
#[derive(Default)]
pub struct RecordingRadio {
    calls: Mutex<Vec<RadioCall>>,
    passwords: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_next_apply: AtomicBool,
    fail_disconnects: AtomicBool,
    call_delay: Duration,
    link: Option<EventSink>,
    associated: AtomicBool,
}

impl RecordingRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold each request for `delay` to widen race windows.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    /// Report `LinkUp` and `IpAcquired` after every accepted apply, and
    /// `LinkDown` when a disconnect drops that association.
    pub fn with_link(mut self, events: EventSink) -> Self {
        self.link = Some(events);
        self
    }

    pub fn fail_next_apply(&self) {
        self.fail_next_apply.store(true, Ordering::SeqCst);
    }

    pub fn fail_disconnects(&self) {
        self.fail_disconnects.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn apply_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RadioCall::Apply(_)))
            .count()
    }

    pub fn last_applied(&self) -> Option<String> {
        self.calls().iter().rev().find_map(|c| match c {
            RadioCall::Apply(ssid) => Some(ssid.clone()),
            RadioCall::Disconnect => None,
        })
    }

    pub fn last_applied_password(&self) -> Option<String> {
        self.passwords.lock().unwrap().last().cloned()
    }

    /// Highest number of requests that were ever executing at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, call: RadioCall) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(call);
        if !self.call_delay.is_zero() {
            std::thread::sleep(self.call_delay);
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl NetworkCapability for RecordingRadio {
    fn disconnect(&self) -> Result<(), CapabilityError> {
        self.enter(RadioCall::Disconnect);
        self.leave();
        if self.fail_disconnects.load(Ordering::SeqCst) {
            return Err(CapabilityError::Rejected("not associated".into()));
        }
        if let Some(link) = &self.link {
            if self.associated.swap(false, Ordering::SeqCst) {
                link.emit(LinkEvent::LinkDown);
            }
        }
        Ok(())
    }

    fn apply_and_connect(&self, credentials: &Credentials) -> Result<(), CapabilityError> {
        self.enter(RadioCall::Apply(credentials.ssid().to_string()));
        self.passwords
            .lock()
            .unwrap()
            .push(credentials.password().to_string());
        self.leave();
        if self.fail_next_apply.swap(false, Ordering::SeqCst) {
            return Err(CapabilityError::Rejected("driver busy".into()));
        }
        if let Some(link) = &self.link {
            self.associated.store(true, Ordering::SeqCst);
            link.emit(LinkEvent::LinkUp);
            link.emit(LinkEvent::IpAcquired);
        }
        Ok(())
    }
}

/// Fake [`ProvisioningTransport`] that counts lifecycle calls.
#[derive(Default)]
pub struct RecordingTransport {
    starts: AtomicUsize,
    stops: AtomicUsize,
    running: AtomicBool,
    fail_next_start: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::SeqCst);
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl ProvisioningTransport for RecordingTransport {
    fn start(&self) -> Result<(), TransportError> {
        if self.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::AddrInUse,
                "port busy",
            )));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Store whose writes always fail. Loads return whatever it was built with.
pub struct FailingStore {
    held: Option<Credentials>,
}

impl FailingStore {
    pub fn empty() -> Self {
        Self { held: None }
    }

    /// Keeps returning `credentials`, as flash that can no longer be rewritten.
    pub fn holding(credentials: Credentials) -> Self {
        Self {
            held: Some(credentials),
        }
    }
}

impl CredentialStore for FailingStore {
    fn load(&self) -> Option<Credentials> {
        self.held.clone()
    }

    fn save(&self, _credentials: &Credentials) -> Result<(), StoreError> {
        Err(StoreError::Io(io::Error::new(
            io::ErrorKind::Other,
            "flash worn out",
        )))
    }
}
