//! NIP-65: Relay List Metadata
//!
//! A replaceable event (kind 10002) advertising the relays a user writes to
//! and the relays where they read mentions. The outbox routing hints are
//! built from these lists.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/65.md>

use crate::Event;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event kind for relay list metadata
pub const RELAY_LIST_METADATA_KIND: u16 = 10002;

/// Tag name for relay entries
pub const RELAY_TAG: &str = "r";

/// Errors that can occur during NIP-65 operations
#[derive(Debug, Error)]
pub enum Nip65Error {
    #[error("event is not a relay list metadata event (kind {0})")]
    InvalidKind(u16),

    #[error("invalid relay tag format: {0}")]
    InvalidTag(String),
}

/// Relay marker indicating usage type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMarker {
    Read,
    Write,
    /// No marker: the relay is used for both
    ReadWrite,
}

impl RelayMarker {
    /// Marker string as it appears in the tag; `None` for read/write.
    pub fn to_str(&self) -> Option<&str> {
        match self {
            RelayMarker::Read => Some("read"),
            RelayMarker::Write => Some("write"),
            RelayMarker::ReadWrite => None,
        }
    }

    pub fn can_read(&self) -> bool {
        matches!(self, RelayMarker::Read | RelayMarker::ReadWrite)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, RelayMarker::Write | RelayMarker::ReadWrite)
    }

    fn parse(s: &str) -> Self {
        match s {
            "read" => RelayMarker::Read,
            "write" => RelayMarker::Write,
            _ => RelayMarker::ReadWrite,
        }
    }
}

/// A relay entry in the relay list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEntry {
    pub url: String,
    pub marker: RelayMarker,
}

impl RelayEntry {
    pub fn new(url: impl Into<String>, marker: RelayMarker) -> Self {
        Self {
            url: url.into(),
            marker,
        }
    }

    /// Convert to an `r` tag
    pub fn to_tag(&self) -> Vec<String> {
        let mut tag = vec![RELAY_TAG.to_string(), self.url.clone()];
        if let Some(marker) = self.marker.to_str() {
            tag.push(marker.to_string());
        }
        tag
    }
}

/// Relay list metadata event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayListMetadata {
    pub relays: Vec<RelayEntry>,
}

impl RelayListMetadata {
    pub fn new(relays: Vec<RelayEntry>) -> Self {
        Self { relays }
    }

    /// Parse from an event
    pub fn from_event(event: &Event) -> Result<Self, Nip65Error> {
        if event.kind != RELAY_LIST_METADATA_KIND {
            return Err(Nip65Error::InvalidKind(event.kind));
        }

        Ok(Self {
            relays: get_relay_entries(event)?,
        })
    }

    /// Relays the owner reads mentions from
    pub fn read_relays(&self) -> Vec<String> {
        self.relays
            .iter()
            .filter(|r| r.marker.can_read())
            .map(|r| r.url.clone())
            .collect()
    }

    /// Relays the owner publishes to
    pub fn write_relays(&self) -> Vec<String> {
        self.relays
            .iter()
            .filter(|r| r.marker.can_write())
            .map(|r| r.url.clone())
            .collect()
    }
}

/// Get relay entries from an event
pub fn get_relay_entries(event: &Event) -> Result<Vec<RelayEntry>, Nip65Error> {
    let mut entries = Vec::new();

    for tag in &event.tags {
        if tag.is_empty() || tag[0] != RELAY_TAG {
            continue;
        }

        if tag.len() < 2 {
            return Err(Nip65Error::InvalidTag(
                "relay tag must have at least URL".to_string(),
            ));
        }

        let marker = tag
            .get(2)
            .map(|m| RelayMarker::parse(m))
            .unwrap_or(RelayMarker::ReadWrite);

        entries.push(RelayEntry::new(tag[1].clone(), marker));
    }

    Ok(entries)
}
