//! Typed network events and their dispatcher.
//!
//! The radio and the provisioning transport raise events through an
//! [`EventSink`]. A single [`EventDispatcher`] task drains them in order and
//! fans each one out to every subscriber that declared interest in its kind.
//!
//! Ingress never blocks and never drops, so sinks are safe to call from
//! driver callbacks. Each subscription is a bounded queue: a slow subscriber
//! back-pressures the dispatcher instead of losing link transitions.
//!
//! ```text
//!  radio ──┐                      ┌──▶ connection manager (link events)
//!          ├─▶ EventSink ─▶ EventDispatcher ──▶ provisioning (provisioning events)
//!  transport ┘                    └──▶ consumers (any subset)
//! ```

use crate::config::RawAnnouncement;
use log::{debug, trace};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Association state changes reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Associated with an access point.
    LinkUp,
    /// Association lost or refused.
    LinkDown,
    /// An address was assigned; the link is usable.
    IpAcquired,
    /// The address was withdrawn.
    IpLost,
}

/// Events raised by the provisioning transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningEvent {
    /// A companion app announced credentials.
    CredentialsAnnounced(RawAnnouncement),
    /// The transport finished its exchange (acknowledgement sent).
    RoundComplete,
}

/// Every event that flows through the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    Link(LinkEvent),
    Provisioning(ProvisioningEvent),
}

impl NetEvent {
    /// The kind subscribers filter on.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Link(LinkEvent::LinkUp) => EventKind::LinkUp,
            Self::Link(LinkEvent::LinkDown) => EventKind::LinkDown,
            Self::Link(LinkEvent::IpAcquired) => EventKind::IpAcquired,
            Self::Link(LinkEvent::IpLost) => EventKind::IpLost,
            Self::Provisioning(ProvisioningEvent::CredentialsAnnounced(_)) => {
                EventKind::CredentialsAnnounced
            }
            Self::Provisioning(ProvisioningEvent::RoundComplete) => {
                EventKind::ProvisioningRoundComplete
            }
        }
    }
}

impl From<LinkEvent> for NetEvent {
    fn from(event: LinkEvent) -> Self {
        Self::Link(event)
    }
}

impl From<ProvisioningEvent> for NetEvent {
    fn from(event: ProvisioningEvent) -> Self {
        Self::Provisioning(event)
    }
}

/// Discriminant of [`NetEvent`], used to declare subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LinkUp,
    LinkDown,
    IpAcquired,
    IpLost,
    CredentialsAnnounced,
    ProvisioningRoundComplete,
}

impl EventKind {
    /// All radio link events.
    pub const LINK: &'static [EventKind] = &[
        EventKind::LinkUp,
        EventKind::LinkDown,
        EventKind::IpAcquired,
        EventKind::IpLost,
    ];

    /// All provisioning transport events.
    pub const PROVISIONING: &'static [EventKind] = &[
        EventKind::CredentialsAnnounced,
        EventKind::ProvisioningRoundComplete,
    ];
}

/// Producer handle for raising events.
#[derive(Debug, Clone)]
pub struct EventSink(mpsc::UnboundedSender<NetEvent>);

impl EventSink {
    /// Raise an event.
    ///
    /// Returns `false` if the dispatcher has shut down.
    pub fn emit(&self, event: impl Into<NetEvent>) -> bool {
        self.0.send(event.into()).is_ok()
    }
}

/// Consumer end of the ingress queue, owned by the dispatcher.
#[derive(Debug)]
pub struct EventSource(mpsc::UnboundedReceiver<NetEvent>);

/// Create the ingress queue shared by all event producers.
pub fn channel() -> (EventSink, EventSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink(tx), EventSource(rx))
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<NetEvent>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the dispatcher has stopped.
    pub async fn recv(&mut self) -> Option<NetEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<NetEvent> {
        self.rx.try_recv().ok()
    }
}

struct Subscriber {
    name: &'static str,
    kinds: Vec<EventKind>,
    tx: mpsc::Sender<NetEvent>,
}

impl Subscriber {
    fn wants(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// Ordered fan-out of [`NetEvent`]s.
///
/// Subscriptions are registered before the dispatcher runs; running consumes
/// it, so the subscriber set is fixed for the dispatcher's lifetime.
pub struct EventDispatcher {
    source: EventSource,
    subscribers: Vec<Subscriber>,
    capacity: usize,
}

impl EventDispatcher {
    /// Create a dispatcher whose subscriptions queue up to `capacity` events.
    pub fn new(source: EventSource, capacity: usize) -> Self {
        Self {
            source,
            subscribers: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register interest in the given event kinds.
    pub fn subscribe(&mut self, name: &'static str, kinds: &[EventKind]) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.push(Subscriber {
            name,
            kinds: kinds.to_vec(),
            tx,
        });
        Subscription { rx }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver events until cancelled or every producer has gone away.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.source.0.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let kind = event.kind();
            trace!("Dispatching {:?}", kind);

            let mut closed = Vec::new();
            for (index, subscriber) in self.subscribers.iter().enumerate() {
                if !subscriber.wants(kind) {
                    continue;
                }
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = subscriber.tx.send(event.clone()) => {
                        if sent.is_err() {
                            closed.push(index);
                        }
                    }
                }
            }
            for index in closed.into_iter().rev() {
                let gone = self.subscribers.remove(index);
                debug!("Subscriber {} went away", gone.name);
            }
        }
        debug!("Event dispatcher stopped");
    }

    /// Run the dispatcher as a background task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
