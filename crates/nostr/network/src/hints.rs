//! Routing hints for the filter planner
//!
//! Hints map authors and contexts to the relays most likely to hold their
//! events. The default implementation follows the NIP-65 outbox model: an
//! author's events are read from the relays the author writes to.

use crate::error::{ClientError, Result};
use nostr::{Address, Event, RELAY_LIST_METADATA_KIND, RelayListMetadata};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub trait RoutingHints: Send + Sync {
    /// Relays supporting full-text search.
    fn search_relays(&self) -> Vec<String>;

    /// General purpose read relays.
    fn read_relays(&self) -> Vec<String>;

    /// Relays to read `pubkey`'s events from. Empty when unknown.
    fn pubkey_relays(&self, pubkey: &str) -> Vec<String>;

    /// Relays serving the context at `address`. Empty when unknown.
    fn context_relays(&self, address: &str) -> Vec<String>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    metadata: RelayListMetadata,
    created_at: u64,
    cached_at: Instant,
}

/// Configuration for outbox hints
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// How long to trust cached relay lists
    pub cache_ttl: Duration,
    pub search_relays: Vec<String>,
    pub read_relays: Vec<String>,
    /// Read relays used when none are configured
    pub fallback_relays: Vec<String>,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600), // 1 hour
            search_relays: vec![],
            read_relays: vec![],
            fallback_relays: vec![],
        }
    }
}

/// Outbox model routing hints
pub struct OutboxHints {
    config: OutboxConfig,
    relay_lists: RwLock<HashMap<String, CacheEntry>>,
    contexts: RwLock<HashMap<String, Vec<String>>>,
}

impl OutboxHints {
    pub fn new(config: OutboxConfig) -> Self {
        Self {
            config,
            relay_lists: RwLock::new(HashMap::new()),
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Store a kind 10002 relay list. Lists older than the stored one are ignored.
    pub fn update_relay_list(&self, event: &Event) -> Result<()> {
        if event.kind != RELAY_LIST_METADATA_KIND {
            return Err(ClientError::InvalidEvent(format!(
                "expected kind {}, got {}",
                RELAY_LIST_METADATA_KIND, event.kind
            )));
        }

        let metadata = RelayListMetadata::from_event(event)
            .map_err(|e| ClientError::InvalidEvent(e.to_string()))?;

        let mut lists = self.relay_lists.write();
        if let Some(existing) = lists.get(&event.pubkey)
            && existing.created_at > event.created_at
        {
            return Ok(());
        }

        lists.insert(
            event.pubkey.clone(),
            CacheEntry {
                metadata,
                created_at: event.created_at,
                cached_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Record the relays serving a community or group.
    pub fn set_context_relays(&self, address: impl Into<String>, relays: Vec<String>) {
        self.contexts.write().insert(address.into(), relays);
    }

    pub fn has_relay_list(&self, pubkey: &str) -> bool {
        self.fresh_entry(pubkey).is_some()
    }

    fn fresh_entry(&self, pubkey: &str) -> Option<RelayListMetadata> {
        let lists = self.relay_lists.read();
        let entry = lists.get(pubkey)?;
        (entry.cached_at.elapsed() < self.config.cache_ttl).then(|| entry.metadata.clone())
    }

    /// Relays where `pubkey` reads mentions.
    pub fn inbox_relays(&self, pubkey: &str) -> Vec<String> {
        self.fresh_entry(pubkey)
            .map(|metadata| metadata.read_relays())
            .unwrap_or_default()
    }
}

impl RoutingHints for OutboxHints {
    fn search_relays(&self) -> Vec<String> {
        self.config.search_relays.clone()
    }

    fn read_relays(&self) -> Vec<String> {
        if self.config.read_relays.is_empty() {
            self.config.fallback_relays.clone()
        } else {
            self.config.read_relays.clone()
        }
    }

    fn pubkey_relays(&self, pubkey: &str) -> Vec<String> {
        self.fresh_entry(pubkey)
            .map(|metadata| metadata.write_relays())
            .unwrap_or_default()
    }

    fn context_relays(&self, address: &str) -> Vec<String> {
        if let Some(relays) = self.contexts.read().get(address)
            && !relays.is_empty()
        {
            return relays.clone();
        }

        // A context without known relays is served by its owner's outbox
        match Address::decode(address) {
            Ok(address) => self.pubkey_relays(&address.pubkey),
            Err(_) => Vec::new(),
        }
    }
}
