//! NIP-02: Follow List
//!
//! Follow lists are kind 3 events. Each followed profile is a "p" tag with
//! an optional relay URL and petname. The routing planner uses them to
//! resolve follow-based author scopes.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/02.md>

use crate::Event;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event kind for contact lists (follow lists)
pub const CONTACT_LIST_KIND: u16 = 3;

/// Errors that can occur during NIP-02 operations
#[derive(Debug, Error)]
pub enum Nip02Error {
    #[error("invalid event kind: expected 3, got {0}")]
    InvalidKind(u16),

    #[error("invalid p-tag format: {0}")]
    InvalidPTag(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
}

/// A single contact in a follow list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// The public key of the followed profile (32-byte hex)
    pub pubkey: String,

    /// Optional relay URL where this profile can be found
    pub relay_url: Option<String>,

    /// Optional local petname for this contact
    pub petname: Option<String>,
}

impl Contact {
    /// Create a new contact with just a public key
    pub fn new(pubkey: impl Into<String>) -> Self {
        Self {
            pubkey: pubkey.into(),
            relay_url: None,
            petname: None,
        }
    }

    /// Convert to a p-tag array
    pub fn to_tag(&self) -> Vec<String> {
        let mut tag = vec!["p".to_string(), self.pubkey.clone()];
        if self.relay_url.is_some() || self.petname.is_some() {
            tag.push(self.relay_url.clone().unwrap_or_default());
        }
        if let Some(ref petname) = self.petname {
            tag.push(petname.clone());
        }
        tag
    }

    /// Parse a contact from a p-tag array
    pub fn from_tag(tag: &[String]) -> Result<Self, Nip02Error> {
        if tag.is_empty() || tag[0] != "p" {
            return Err(Nip02Error::InvalidPTag(
                "tag must start with 'p'".to_string(),
            ));
        }

        if tag.len() < 2 {
            return Err(Nip02Error::InvalidPTag(
                "p-tag must have at least pubkey".to_string(),
            ));
        }

        let pubkey = tag[1].clone();

        if pubkey.len() != 64 || !pubkey.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Nip02Error::InvalidPublicKey(format!(
                "pubkey must be 64-character hex, got: {}",
                pubkey
            )));
        }

        let relay_url = tag.get(2).filter(|s| !s.is_empty()).cloned();
        let petname = tag.get(3).filter(|s| !s.is_empty()).cloned();

        Ok(Self {
            pubkey,
            relay_url,
            petname,
        })
    }
}

/// Contact list (follow list) event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactList {
    pub event: Event,
    pub contacts: Vec<Contact>,
}

impl ContactList {
    /// Create a new contact list from an event.
    ///
    /// Malformed p-tags are an error; relays do serve such lists, so callers
    /// that only want the usable entries should use [`ContactList::from_event_lossy`].
    pub fn from_event(event: Event) -> Result<Self, Nip02Error> {
        if event.kind != CONTACT_LIST_KIND {
            return Err(Nip02Error::InvalidKind(event.kind));
        }

        let mut contacts = Vec::new();
        for tag in &event.tags {
            if !tag.is_empty() && tag[0] == "p" {
                contacts.push(Contact::from_tag(tag)?);
            }
        }

        Ok(Self { event, contacts })
    }

    /// Create a contact list, skipping p-tags that do not parse.
    pub fn from_event_lossy(event: Event) -> Result<Self, Nip02Error> {
        if event.kind != CONTACT_LIST_KIND {
            return Err(Nip02Error::InvalidKind(event.kind));
        }

        let contacts = event
            .tags
            .iter()
            .filter(|tag| !tag.is_empty() && tag[0] == "p")
            .filter_map(|tag| Contact::from_tag(tag).ok())
            .collect();

        Ok(Self { event, contacts })
    }

    /// Author of the list
    pub fn owner(&self) -> &str {
        &self.event.pubkey
    }

    /// Check if a public key is in the contact list
    pub fn contains(&self, pubkey: &str) -> bool {
        self.contacts.iter().any(|c| c.pubkey == pubkey)
    }

    /// Get all public keys in the contact list, in tag order
    pub fn get_pubkeys(&self) -> Vec<String> {
        self.contacts.iter().map(|c| c.pubkey.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}
