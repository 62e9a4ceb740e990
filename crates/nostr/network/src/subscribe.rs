//! Subscription coordinator
//!
//! Sends filters to a set of relays and merges what comes back: events are
//! deduplicated across relays, verified, matched against the filters, and
//! handed out once. Per-relay EOSE is tracked for timing and for early close.

use crate::bus::NetworkEvent;
use crate::message::{ClientMessage, RelayMessage};
use crate::network::NetworkContext;
use crate::session::{Session, SessionMessage, SessionOptions};
use nostr::{Event, Filter, SeenOn, matches_any};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Generate a unique subscription ID.
pub fn generate_subscription_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

pub type EventCallback = Box<dyn FnMut(Event) + Send>;
pub type EoseCallback = Box<dyn FnMut(&str) + Send>;

/// A subscription request.
pub struct SubscribeRequest {
    pub relays: Vec<String>,
    pub filters: Vec<Filter>,
    /// Close after this long, or as soon as every relay sent EOSE. Zero means no timeout.
    pub timeout: Option<Duration>,
    /// Push accepted events onto the ingestion queue
    pub should_process: bool,
    on_event: Option<EventCallback>,
    on_eose: Option<EoseCallback>,
}

impl fmt::Debug for SubscribeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeRequest")
            .field("relays", &self.relays)
            .field("filters", &self.filters)
            .field("timeout", &self.timeout)
            .field("should_process", &self.should_process)
            .finish_non_exhaustive()
    }
}

impl SubscribeRequest {
    pub fn new(relays: Vec<String>, filters: impl IntoIterator<Item = Filter>) -> Self {
        Self {
            relays,
            filters: filters.into_iter().collect(),
            timeout: None,
            should_process: true,
            on_event: None,
            on_eose: None,
        }
    }

    /// Add another filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn should_process(mut self, should_process: bool) -> Self {
        self.should_process = should_process;
        self
    }

    /// Called once per unique, verified, matching event.
    pub fn on_event(mut self, callback: impl FnMut(Event) + Send + 'static) -> Self {
        self.on_event = Some(Box::new(callback));
        self
    }

    /// Called with the relay URL on every EOSE.
    pub fn on_eose(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_eose = Some(Box::new(callback));
        self
    }
}

struct Shared {
    close: watch::Sender<bool>,
    done: watch::Sender<bool>,
    seen: Mutex<HashMap<String, SeenOn>>,
}

/// Handle to a live subscription.
///
/// Dropping the handle does not close the subscription; call [`close`](Self::close).
#[derive(Clone)]
pub struct Subscription {
    id: String,
    urls: Vec<String>,
    shared: Arc<Shared>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("urls", &self.urls)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Request close. Calling it again is a no-op.
    pub fn close(&self) {
        self.shared.close.send_replace(true);
    }

    /// Whether teardown has finished.
    pub fn is_closed(&self) -> bool {
        *self.shared.done.borrow()
    }

    /// Wait until the subscription is closed and torn down.
    pub async fn closed(&self) {
        let mut done = self.shared.done.subscribe();
        while !*done.borrow_and_update() {
            if done.changed().await.is_err() {
                return;
            }
        }
    }

    /// Relays that delivered `event_id`, in discovery order.
    ///
    /// The table is cleared on close; delivered events keep their own `seen_on`.
    pub fn seen_on(&self, event_id: &str) -> Option<Vec<String>> {
        self.shared.seen.lock().get(event_id).map(SeenOn::to_vec)
    }
}

pub(crate) fn subscribe(ctx: &Arc<NetworkContext>, request: SubscribeRequest) -> Subscription {
    let id = generate_subscription_id();
    let (session, rx) = Session::open(ctx, &request.relays, SessionOptions::default());
    let urls = session.urls().to_vec();

    let (close, close_rx) = watch::channel(false);
    let (done, _) = watch::channel(false);
    let shared = Arc::new(Shared {
        close,
        done,
        seen: Mutex::new(HashMap::new()),
    });

    info!(
        "Starting subscription {} with {} relays",
        id,
        urls.len()
    );
    ctx.bus.emit(NetworkEvent::SubOpen {
        id: id.clone(),
        urls: urls.clone(),
    });

    session.send(&ClientMessage::Req {
        subscription_id: id.clone(),
        filters: request.filters.clone(),
    });

    let timeout = request.timeout.filter(|timeout| !timeout.is_zero());
    let started = Instant::now();
    let deadline = timeout.map(|timeout| started + timeout);
    let driver = Driver {
        ctx: Arc::clone(ctx),
        id: id.clone(),
        urls: urls.clone(),
        filters: request.filters,
        should_process: request.should_process,
        has_timeout: timeout.is_some(),
        on_event: request.on_event,
        on_eose: request.on_eose,
        started,
        eose: HashSet::new(),
        shared: Arc::clone(&shared),
    };
    tokio::spawn(driver.run(session, rx, close_rx, deadline));

    Subscription { id, urls, shared }
}

struct Driver {
    ctx: Arc<NetworkContext>,
    id: String,
    urls: Vec<String>,
    filters: Vec<Filter>,
    should_process: bool,
    has_timeout: bool,
    on_event: Option<EventCallback>,
    on_eose: Option<EoseCallback>,
    started: Instant,
    eose: HashSet<String>,
    shared: Arc<Shared>,
}

impl Driver {
    async fn run(
        mut self,
        session: Session,
        mut rx: mpsc::UnboundedReceiver<SessionMessage>,
        mut close_rx: watch::Receiver<bool>,
        deadline: Option<Instant>,
    ) {
        let timer = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timer);
        let mut open = true;

        loop {
            tokio::select! {
                biased;
                _ = close_rx.changed() => break,
                _ = &mut timer => {
                    debug!("subscription {} timed out", self.id);
                    break;
                }
                message = rx.recv(), if open => match message {
                    Some(SessionMessage::Relay { url, message }) => {
                        if self.handle(url, message) {
                            break;
                        }
                    }
                    Some(SessionMessage::SendFailed { url, error }) => {
                        debug!("subscription {} could not reach {}: {}", self.id, url, error);
                    }
                    None => open = false,
                },
            }
        }

        session.send(&ClientMessage::Close {
            subscription_id: self.id.clone(),
        });
        session.cleanup();
        self.shared.seen.lock().clear();

        self.ctx.bus.emit(NetworkEvent::SubClose {
            id: self.id.clone(),
            urls: self.urls.clone(),
        });
        self.shared.close.send_replace(true);
        self.shared.done.send_replace(true);
        info!("Closed subscription {}", self.id);
    }

    /// Returns true when the subscription should close.
    fn handle(&mut self, url: String, message: RelayMessage) -> bool {
        match message {
            RelayMessage::Event {
                subscription_id,
                event,
            } if subscription_id == self.id => {
                self.handle_event(url, event);
                false
            }
            RelayMessage::Eose { subscription_id } if subscription_id == self.id => {
                self.handle_eose(url)
            }
            RelayMessage::Closed {
                subscription_id,
                message,
            } if subscription_id == self.id => {
                warn!("{} closed subscription {}: {}", url, self.id, message);
                false
            }
            RelayMessage::Notice { message } => {
                debug!("notice from {}: {}", url, message);
                false
            }
            _ => false,
        }
    }

    fn handle_event(&mut self, url: String, event: Event) {
        {
            let mut seen = self.shared.seen.lock();
            if let Some(seen_on) = seen.get(&event.id) {
                seen_on.push(url);
                return;
            }
            event.seen_on.push(url.clone());
            seen.insert(event.id.clone(), event.seen_on.clone());
        }

        match self.ctx.verifier.verify(&event) {
            Ok(true) => {}
            Ok(false) => {
                debug!("dropping event {} from {}: bad signature", event.id, url);
                return;
            }
            Err(e) => {
                error!("failed to verify event {} from {}: {}", event.id, url, e);
                return;
            }
        }

        if !matches_any(&self.filters, &event) {
            debug!("dropping event {} from {}: no filter matched", event.id, url);
            return;
        }

        self.ctx.bus.emit(NetworkEvent::Event {
            url,
            event: event.clone(),
        });

        if self.should_process
            && let Some(ingest) = &self.ctx.ingest
        {
            let _ = ingest.send(event.clone());
        }

        if let Some(on_event) = self.on_event.as_mut() {
            on_event(event);
        }
    }

    fn handle_eose(&mut self, url: String) -> bool {
        if let Some(on_eose) = self.on_eose.as_mut() {
            on_eose(&url);
        }

        if self.eose.insert(url.clone()) {
            self.ctx.bus.emit(NetworkEvent::Eose {
                url,
                elapsed: self.started.elapsed(),
            });
        }

        self.has_timeout && self.eose.len() >= self.urls.len()
    }
}
