//! Relay capability lookup
//!
//! The session builder asks whether a relay wants payment or authentication
//! before it serves requests, to decide whether to hold traffic back.

use crate::url::normalize_relay_url;
use nostr::RelayInformation;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::warn;

/// What a relay demands before serving requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayCapabilities {
    pub payment_required: bool,
    pub auth_required: bool,
}

impl RelayCapabilities {
    /// Whether normal traffic should wait for the relay to boot.
    pub fn requires_boot(&self) -> bool {
        self.payment_required || self.auth_required
    }
}

impl From<&RelayInformation> for RelayCapabilities {
    fn from(info: &RelayInformation) -> Self {
        Self {
            payment_required: info.payment_required(),
            auth_required: info.auth_required(),
        }
    }
}

pub trait RelayInfoProvider: Send + Sync {
    fn capabilities(&self, url: &str) -> RelayCapabilities;
}

/// In-memory store of NIP-11 documents.
#[derive(Debug, Default)]
pub struct RelayInfoCache {
    documents: RwLock<HashMap<String, RelayInformation>>,
}

impl RelayInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(url: &str) -> String {
        normalize_relay_url(url).unwrap_or_else(|_| url.to_string())
    }

    pub fn insert(&self, url: &str, info: RelayInformation) {
        self.documents.write().insert(Self::key(url), info);
    }

    /// Store a raw NIP-11 JSON document. Malformed documents are logged and ignored.
    pub fn insert_json(&self, url: &str, json: &str) -> bool {
        match RelayInformation::from_json(json) {
            Ok(info) => {
                self.insert(url, info);
                true
            }
            Err(e) => {
                warn!("ignoring malformed relay information for {}: {}", url, e);
                false
            }
        }
    }

    pub fn get(&self, url: &str) -> Option<RelayInformation> {
        self.documents.read().get(&Self::key(url)).cloned()
    }
}

impl RelayInfoProvider for RelayInfoCache {
    fn capabilities(&self, url: &str) -> RelayCapabilities {
        self.documents
            .read()
            .get(&Self::key(url))
            .map(RelayCapabilities::from)
            .unwrap_or_default()
    }
}
