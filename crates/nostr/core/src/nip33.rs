//! Addressable event coordinates (`kind:pubkey:d-tag`).
//!
//! Addressable events (kinds 30000-39999) are referenced from `a` tags by
//! coordinate. Some of them name a *context* (a community or a group) that
//! has its own relays; filters referencing a context are routed there.

use crate::Event;
use std::fmt;
use thiserror::Error;

/// Minimum addressable event kind
pub const ADDRESSABLE_KIND_MIN: u16 = 30000;

/// Maximum addressable event kind
pub const ADDRESSABLE_KIND_MAX: u16 = 39999;

/// NIP-72 community definition
pub const KIND_COMMUNITY: u16 = 34550;

/// Group definition
pub const KIND_GROUP: u16 = 35834;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Nip33Error {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Check if an event kind is addressable
pub fn is_addressable_kind(kind: u16) -> bool {
    (ADDRESSABLE_KIND_MIN..=ADDRESSABLE_KIND_MAX).contains(&kind)
}

/// A decoded `kind:pubkey:d-tag` coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub kind: u16,
    pub pubkey: String,
    pub identifier: String,
}

impl Address {
    /// Decode a coordinate string.
    pub fn decode(address: &str) -> Result<Self, Nip33Error> {
        let parts: Vec<&str> = address.splitn(3, ':').collect();

        if parts.len() != 3 {
            return Err(Nip33Error::InvalidAddress(
                "address must have format kind:pubkey:dtag".to_string(),
            ));
        }

        let kind = parts[0]
            .parse::<u16>()
            .map_err(|_| Nip33Error::InvalidAddress("invalid kind".to_string()))?;

        if !is_addressable_kind(kind) {
            return Err(Nip33Error::InvalidAddress(format!(
                "kind {} is not addressable (must be 30000-39999)",
                kind
            )));
        }

        let pubkey = parts[1];
        if pubkey.len() != 64 || !pubkey.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Nip33Error::InvalidAddress(
                "pubkey must be 64 hex characters".to_string(),
            ));
        }

        Ok(Self {
            kind,
            pubkey: pubkey.to_string(),
            identifier: parts[2].to_string(),
        })
    }

    /// Coordinate of an addressable event, using its `d` tag.
    pub fn from_event(event: &Event) -> Result<Self, Nip33Error> {
        if !is_addressable_kind(event.kind) {
            return Err(Nip33Error::InvalidAddress(format!(
                "kind {} is not addressable",
                event.kind
            )));
        }

        Ok(Self {
            kind: event.kind,
            pubkey: event.pubkey.clone(),
            identifier: event.tag_values("d").next().unwrap_or_default().to_string(),
        })
    }

    /// Communities and groups are contexts with their own relays.
    pub fn is_context(&self) -> bool {
        matches!(self.kind, KIND_COMMUNITY | KIND_GROUP)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.pubkey, self.identifier)
    }
}

/// Whether `address` decodes to a community or group coordinate.
pub fn is_context_address(address: &str) -> bool {
    Address::decode(address).is_ok_and(|a| a.is_context())
}
