//! Publish coordinator
//!
//! Sends one event to a set of relays and classifies every relay as
//! succeeded, failed or timed out. Publishing never fails as a whole; a relay
//! that cannot be reached simply ends up in `failed` or `timed_out`.

use crate::bus::NetworkEvent;
use crate::message::{ClientMessage, RelayMessage};
use crate::network::NetworkContext;
use crate::session::{Session, SessionMessage, SessionOptions};
use nostr::Event;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

/// Verb used to send the event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PublishVerb {
    #[default]
    Event,
    /// NIP-42 response; bypasses boot gates
    Auth,
}

impl PublishVerb {
    fn message(self, event: Event) -> ClientMessage {
        match self {
            PublishVerb::Event => ClientMessage::Event(event),
            PublishVerb::Auth => ClientMessage::Auth(event),
        }
    }
}

/// Per-relay outcome of a publish.
///
/// The four sets always partition the relays the event was sent to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishProgress {
    pub succeeded: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    pub timed_out: BTreeSet<String>,
    pub pending: BTreeSet<String>,
}

impl PublishProgress {
    fn new(urls: &[String]) -> Self {
        Self {
            pending: urls.iter().cloned().collect(),
            ..Default::default()
        }
    }

    /// Relays with a final outcome.
    pub fn completed(&self) -> BTreeSet<String> {
        self.succeeded
            .iter()
            .chain(&self.failed)
            .chain(&self.timed_out)
            .cloned()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    fn accept(&mut self, url: &str) -> bool {
        if !(self.pending.remove(url) || self.failed.remove(url) || self.timed_out.remove(url)) {
            return false;
        }
        self.succeeded.insert(url.to_string());
        true
    }

    fn reject(&mut self, url: &str) -> bool {
        if !(self.pending.remove(url) || self.timed_out.remove(url)) {
            return false;
        }
        self.failed.insert(url.to_string());
        true
    }

    fn expire(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.timed_out.append(&mut self.pending);
        true
    }
}

pub type ProgressCallback = Box<dyn FnMut(&PublishProgress) + Send>;

/// A publish request.
pub struct PublishRequest {
    pub relays: Vec<String>,
    pub event: Event,
    /// Falls back to the configured publish timeout
    pub timeout: Option<Duration>,
    pub verb: PublishVerb,
    on_progress: Option<ProgressCallback>,
}

impl fmt::Debug for PublishRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishRequest")
            .field("relays", &self.relays)
            .field("event", &self.event.id)
            .field("timeout", &self.timeout)
            .field("verb", &self.verb)
            .finish_non_exhaustive()
    }
}

impl PublishRequest {
    pub fn new(relays: Vec<String>, event: Event) -> Self {
        Self {
            relays,
            event,
            timeout: None,
            verb: PublishVerb::Event,
            on_progress: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn verb(mut self, verb: PublishVerb) -> Self {
        self.verb = verb;
        self
    }

    /// Called with a snapshot before anything is sent and after every change.
    pub fn on_progress(mut self, callback: impl FnMut(&PublishProgress) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }
}

fn report(callback: &mut Option<ProgressCallback>, progress: &PublishProgress) {
    if let Some(callback) = callback.as_mut() {
        callback(progress);
    }
}

pub(crate) async fn publish(ctx: &Arc<NetworkContext>, request: PublishRequest) -> PublishProgress {
    let PublishRequest {
        relays,
        event,
        timeout,
        verb,
        mut on_progress,
    } = request;

    let deadline = Instant::now() + timeout.unwrap_or_else(|| ctx.config.publish_timeout());
    let (session, mut rx) = Session::open(
        ctx,
        &relays,
        SessionOptions {
            bypass_auth_gate: verb == PublishVerb::Auth,
        },
    );

    let mut progress = PublishProgress::new(session.urls());
    ctx.bus.emit(NetworkEvent::Publish(session.urls().to_vec()));
    info!("Publishing {} to {} relays", event.id, session.urls().len());
    report(&mut on_progress, &progress);

    if !progress.is_complete() {
        let event_id = event.id.clone();
        session.send(&verb.message(event));

        let timer = sleep_until(deadline);
        tokio::pin!(timer);
        let mut open = true;

        while !progress.is_complete() {
            let changed = tokio::select! {
                _ = &mut timer => progress.expire(),
                message = rx.recv(), if open => match message {
                    Some(SessionMessage::Relay {
                        url,
                        message: RelayMessage::Ok { event_id: id, success, message },
                    }) if id == event_id => {
                        if success {
                            progress.accept(&url)
                        } else {
                            debug!("{} rejected {}: {}", url, id, message);
                            progress.reject(&url)
                        }
                    }
                    Some(SessionMessage::SendFailed { url, .. }) => progress.reject(&url),
                    Some(_) => false,
                    None => {
                        open = false;
                        false
                    }
                },
            };

            if changed {
                report(&mut on_progress, &progress);
            }
        }
    }

    info!(
        "Finished publishing to {} relays: {} succeeded, {} failed, {} timed out",
        session.urls().len(),
        progress.succeeded.len(),
        progress.failed.len(),
        progress.timed_out.len()
    );
    session.cleanup();
    progress
}
