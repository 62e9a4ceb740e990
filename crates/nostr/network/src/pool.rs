//! Shared connection pool
//!
//! One transport per normalized relay URL, shared by every request. Entries
//! carry the relay's boot gate. The pool also keeps the NIP-42 bookkeeping
//! needed to answer each challenge once and to recognise the relay's reply to
//! our AUTH event, keyed by relay URL so it works through a multiplexer too.

use crate::error::Result;
use crate::gate::BootGate;
use crate::transport::{SocketStatus, Transport, TransportFactory};
use crate::url::normalize_relay_url;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A pooled transport with its boot gate
pub struct PoolEntry {
    transport: Arc<dyn Transport>,
    gate: BootGate,
}

impl PoolEntry {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            gate: BootGate::new(),
        }
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn gate(&self) -> &BootGate {
        &self.gate
    }

    pub fn has_error(&self) -> bool {
        self.transport.status() == SocketStatus::Error
    }
}

#[derive(Default)]
struct AuthState {
    answered: HashSet<String>,
    pending: HashSet<String>,
}

/// Process-wide transport registry keyed by normalized URL
pub struct ConnectionPool {
    factory: Arc<dyn TransportFactory>,
    entries: RwLock<HashMap<String, Arc<PoolEntry>>>,
    auth: Mutex<HashMap<String, AuthState>>,
    booted: AtomicBool,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            entries: RwLock::new(HashMap::new()),
            auth: Mutex::new(HashMap::new()),
            booted: AtomicBool::new(false),
        }
    }

    /// Get the entry for a relay, creating its transport on first use.
    pub fn get(&self, url: &str) -> Result<Arc<PoolEntry>> {
        let url = normalize_relay_url(url)?;

        if let Some(entry) = self.entries.read().get(&url) {
            return Ok(Arc::clone(entry));
        }

        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(&url) {
            return Ok(Arc::clone(entry));
        }

        debug!("creating transport for {}", url);
        let entry = Arc::new(PoolEntry::new(self.factory.create(&url)?));
        entries.insert(url, Arc::clone(&entry));
        Ok(entry)
    }

    /// Get an entry without creating one.
    pub fn peek(&self, url: &str) -> Option<Arc<PoolEntry>> {
        let url = normalize_relay_url(url).ok()?;
        self.entries.read().get(&url).cloned()
    }

    pub fn has(&self, url: &str) -> bool {
        self.peek(url).is_some()
    }

    /// Whether a pooled transport for `url` is in error. Unknown relays have none.
    pub fn relay_has_error(&self, url: &str) -> bool {
        self.peek(url).is_some_and(|entry| entry.has_error())
    }

    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.entries.read().keys().cloned().collect();
        urls.sort();
        urls
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Record a challenge from `url` as answered. Returns false if it already was.
    pub fn claim_challenge(&self, url: &str, challenge: &str) -> bool {
        self.auth
            .lock()
            .entry(url.to_string())
            .or_default()
            .answered
            .insert(challenge.to_string())
    }

    /// Forget a claim whose AUTH never went out, so the challenge can be answered again.
    pub fn release_challenge(&self, url: &str, challenge: &str) {
        if let Some(state) = self.auth.lock().get_mut(url) {
            state.answered.remove(challenge);
        }
    }

    /// Remember the id of an AUTH event sent to `url` so its OK can be recognised.
    pub fn track_auth(&self, url: &str, event_id: &str) {
        self.auth
            .lock()
            .entry(url.to_string())
            .or_default()
            .pending
            .insert(event_id.to_string());
    }

    /// Consume a tracked AUTH id. Returns true if the id was ours.
    pub fn take_auth(&self, url: &str, event_id: &str) -> bool {
        self.auth
            .lock()
            .get_mut(url)
            .is_some_and(|state| state.pending.remove(event_id))
    }

    /// Mark that some relay completed the AUTH handshake.
    pub fn mark_booted(&self) {
        self.booted.store(true, Ordering::SeqCst);
    }

    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::SeqCst)
    }
}
