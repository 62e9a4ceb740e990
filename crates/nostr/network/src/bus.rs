//! Network event bus
//!
//! Every coordinator reports what it does on a single broadcast channel so
//! that observers (caches, UIs, metrics) can follow network activity without
//! hooking into individual requests.

use nostr::Event;
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;

/// Relay error classes reported on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayErrorKind {
    /// The relay asked us to authenticate
    Unauthorized,
    /// The relay refused our authentication
    Forbidden,
}

impl fmt::Display for RelayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayErrorKind::Unauthorized => write!(f, "unauthorized"),
            RelayErrorKind::Forbidden => write!(f, "forbidden"),
        }
    }
}

/// Events emitted on the bus.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A publish was started towards these relays
    Publish(Vec<String>),
    /// A subscription was opened on these relays
    SubOpen { id: String, urls: Vec<String> },
    /// A subscription was closed
    SubClose { id: String, urls: Vec<String> },
    /// A verified event matching some subscription arrived
    Event { url: String, event: Event },
    /// A relay finished sending stored events for a subscription
    Eose { url: String, elapsed: Duration },
    /// A relay entered an error state
    ErrorSet { url: String, kind: RelayErrorKind },
    /// A relay error was cleared; `None` clears every kind
    ErrorClear {
        url: String,
        kind: Option<RelayErrorKind>,
    },
}

const DEFAULT_CAPACITY: usize = 4096;

/// Broadcast bus for [`NetworkEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NetworkEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event. Events emitted while nobody listens are dropped.
    pub fn emit(&self, event: NetworkEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
